//! Great-circle geometry on a spherical Earth

use crate::models::Coordinate;

/// Mean Earth radius in meters
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Haversine distance between two coordinates in meters.
///
/// The haversine term is clamped to [0, 1] so rounding near antipodal or
/// coincident points never produces NaN.
pub fn distance_meters(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    let h = h.clamp(0.0, 1.0);

    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_METERS * c
}

/// Initial bearing from `a` towards `b`, degrees clockwise from north in [0, 360)
pub fn initial_bearing_degrees(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let y = d_lon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * d_lon.cos();

    let bearing = y.atan2(x).to_degrees().rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if bearing >= 360.0 {
        0.0
    } else {
        bearing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_identical_points() {
        let p = Coordinate::new(-6.9175, 107.6191);
        assert_eq!(distance_meters(p, p), 0.0);
    }

    #[test]
    fn test_one_milli_degree_at_equator() {
        let d = distance_meters(Coordinate::new(0.0, 0.0), Coordinate::new(0.0, 0.001));
        // 2πR / 360 / 1000
        assert!((d - 111.195).abs() < 0.01, "got {}", d);
    }

    #[test]
    fn test_antipodal_points_are_stable() {
        let d = distance_meters(Coordinate::new(0.0, 0.0), Coordinate::new(0.0, 180.0));
        assert!(d.is_finite());
        assert!((d - std::f64::consts::PI * EARTH_RADIUS_METERS).abs() < 1.0);
    }

    #[test]
    fn test_bearings() {
        let origin = Coordinate::new(0.0, 0.0);
        assert!((initial_bearing_degrees(origin, Coordinate::new(1.0, 0.0)) - 0.0).abs() < 1e-9);
        assert!((initial_bearing_degrees(origin, Coordinate::new(0.0, 1.0)) - 90.0).abs() < 1e-9);
        assert!((initial_bearing_degrees(origin, Coordinate::new(-1.0, 0.0)) - 180.0).abs() < 1e-9);
        assert!((initial_bearing_degrees(origin, Coordinate::new(0.0, -1.0)) - 270.0).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn test_distance_identity(lat in -90.0f64..90.0, lon in -180.0f64..180.0) {
            let p = Coordinate::new(lat, lon);
            prop_assert_eq!(distance_meters(p, p), 0.0);
        }

        #[test]
        fn test_distance_symmetry(
            lat1 in -90.0f64..90.0,
            lon1 in -180.0f64..180.0,
            lat2 in -90.0f64..90.0,
            lon2 in -180.0f64..180.0,
        ) {
            let a = Coordinate::new(lat1, lon1);
            let b = Coordinate::new(lat2, lon2);
            let ab = distance_meters(a, b);
            let ba = distance_meters(b, a);

            prop_assert!(ab >= 0.0);
            prop_assert!(ab.is_finite());
            prop_assert!((ab - ba).abs() < 1e-6);
            // Never longer than half the circumference
            prop_assert!(ab <= std::f64::consts::PI * EARTH_RADIUS_METERS + 1e-6);
        }

        #[test]
        fn test_bearing_range(
            lat1 in -89.0f64..89.0,
            lon1 in -180.0f64..180.0,
            lat2 in -89.0f64..89.0,
            lon2 in -180.0f64..180.0,
        ) {
            let bearing = initial_bearing_degrees(Coordinate::new(lat1, lon1), Coordinate::new(lat2, lon2));
            prop_assert!((0.0..360.0).contains(&bearing));
        }
    }
}

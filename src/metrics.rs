//! Derived session metrics
//!
//! Pure functions over the accumulator's state: elevation gain, pace,
//! calorie estimate and heart-rate average. Nothing here caches; callers
//! recompute on every tick or sample.

use crate::formatters;
use crate::models::{Activity, DerivedMetrics, GeoSample, SessionSnapshot};

/// Average pace is undefined below this distance, early GPS noise would
/// otherwise produce absurd values
pub const MIN_PACE_DISTANCE_METERS: f64 = 10.0;

/// Trailing window for the instantaneous pace
pub const CURRENT_PACE_WINDOW_MS: i64 = 15_000;

/// Minimum distance covered inside the window for a current pace
const MIN_WINDOW_DISTANCE_METERS: f64 = 1.0;

/// Sum of positive altitude deltas between consecutive samples
pub fn elevation_gain(path: &[GeoSample]) -> f64 {
    path.windows(2)
        .map(|pair| pair[1].altitude - pair[0].altitude)
        .filter(|delta| *delta > 0.0)
        .fold(0.0, |gain, delta| gain + delta)
}

/// Whole-session pace in seconds per kilometer
pub fn average_pace(distance_meters: f64, elapsed_ms: i64) -> Option<f64> {
    if !distance_meters.is_finite() || distance_meters < MIN_PACE_DISTANCE_METERS || elapsed_ms <= 0 {
        return None;
    }

    let pace = (elapsed_ms as f64 / 1000.0) / (distance_meters / 1000.0);
    pace.is_finite().then_some(pace)
}

/// Pace over the last [`CURRENT_PACE_WINDOW_MS`] of the path.
///
/// Walks backwards from the newest sample and stops before the first sample
/// older than the window.
pub fn current_pace(path: &[GeoSample]) -> Option<f64> {
    let last = path.last()?;
    let window_start = last.timestamp - CURRENT_PACE_WINDOW_MS;

    let mut distance = 0.0;
    let mut earliest = last.timestamp;

    for pair in path.windows(2).rev() {
        let (prev, next) = (&pair[0], &pair[1]);
        if prev.timestamp < window_start {
            break;
        }
        distance += crate::geo::distance_meters(prev.coordinate(), next.coordinate());
        earliest = prev.timestamp;
    }

    let span_ms = last.timestamp - earliest;
    if distance < MIN_WINDOW_DISTANCE_METERS || span_ms <= 0 {
        return None;
    }

    let pace = (span_ms as f64 / 1000.0) / (distance / 1000.0);
    pace.is_finite().then_some(pace)
}

/// Metabolic equivalent for a given speed in km/h
fn met_for_speed(speed_kmh: f64) -> f64 {
    match speed_kmh {
        s if !(s >= 0.0) => 3.5,
        s if s < 4.0 => 3.0,
        s if s < 8.0 => 8.0,
        _ => 10.0,
    }
}

/// MET-based energy estimate in kcal, rounded to the nearest integer
pub fn calories_burned(duration_ms: i64, weight_kg: f64, distance_meters: f64) -> u32 {
    if duration_ms <= 0 || !(weight_kg > 0.0) {
        return 0;
    }

    let hours = duration_ms as f64 / 1000.0 / 3600.0;
    let speed_kmh = (distance_meters / 1000.0) / hours;
    let kcal = met_for_speed(speed_kmh) * weight_kg * hours;

    if kcal.is_finite() {
        kcal.round().clamp(0.0, u32::MAX as f64) as u32
    } else {
        0
    }
}

/// Rounded arithmetic mean, 0 for no samples
pub fn average_heart_rate(samples: &[u32]) -> u32 {
    if samples.is_empty() {
        return 0;
    }
    let sum: u64 = samples.iter().map(|&bpm| u64::from(bpm)).sum();
    (sum as f64 / samples.len() as f64).round() as u32
}

impl DerivedMetrics {
    /// Recompute every live metric from the current session state
    pub fn compute(
        elapsed_ms: i64,
        distance_meters: f64,
        path: &[GeoSample],
        heart_rate_samples: &[u32],
        weight_kg: f64,
    ) -> Self {
        Self {
            elapsed_ms,
            distance_meters,
            average_pace_sec_per_km: average_pace(distance_meters, elapsed_ms),
            current_pace_sec_per_km: current_pace(path),
            elevation_gain_meters: elevation_gain(path),
            calories_kcal: calories_burned(elapsed_ms, weight_kg, distance_meters),
            average_heart_rate_bpm: average_heart_rate(heart_rate_samples),
            current_heart_rate_bpm: heart_rate_samples.last().copied().unwrap_or(0),
        }
    }
}

impl Activity {
    /// Build the persisted record from a stopped session
    pub fn from_snapshot(snapshot: SessionSnapshot, weight_kg: f64) -> Self {
        let elevation_gain_meters = elevation_gain(&snapshot.path);
        Self {
            start_time: snapshot.start_time,
            end_time: snapshot.end_time,
            duration_ms: snapshot.elapsed_ms,
            distance_meters: snapshot.distance_meters,
            calories_kcal: calories_burned(snapshot.elapsed_ms, weight_kg, snapshot.distance_meters),
            pace_string: formatters::format_pace(snapshot.distance_meters, snapshot.elapsed_ms),
            average_heart_rate_bpm: average_heart_rate(&snapshot.heart_rate_samples),
            elevation_gain_meters,
            path: snapshot.path,
            heart_rate_samples: snapshot.heart_rate_samples,
        }
    }
}

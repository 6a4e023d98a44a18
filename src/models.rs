use serde::{Deserialize, Serialize};
use std::fmt;

/// A latitude/longitude pair in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Finite latitude in [-90, 90] and longitude in [-180, 180]
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Location payload as delivered by a location provider.
///
/// Everything except the position is optional; it is normalised into a
/// [`GeoSample`] exactly once via [`GeoSample::from_raw`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub accuracy: Option<f64>,
    /// Fix time in milliseconds since the Unix epoch
    pub timestamp: Option<i64>,
}

/// A single admitted GPS fix
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoSample {
    pub latitude: f64,
    pub longitude: f64,

    /// Meters above sea level, 0 when the provider reported none
    pub altitude: f64,

    /// Milliseconds since the Unix epoch
    pub timestamp: i64,

    /// Horizontal accuracy radius in meters
    pub horizontal_accuracy: Option<f64>,
}

impl GeoSample {
    pub fn new(latitude: f64, longitude: f64, altitude: f64, timestamp: i64) -> Self {
        Self {
            latitude,
            longitude,
            altitude,
            timestamp,
            horizontal_accuracy: None,
        }
    }

    pub fn with_accuracy(mut self, meters: f64) -> Self {
        self.horizontal_accuracy = Some(meters);
        self
    }

    /// Normalise a provider payload. Missing altitude becomes 0, a missing
    /// timestamp becomes `received_at`, and a non-finite accuracy is dropped.
    pub fn from_raw(raw: &RawLocation, received_at: i64) -> Self {
        Self {
            latitude: raw.latitude,
            longitude: raw.longitude,
            altitude: raw.altitude.filter(|a| a.is_finite()).unwrap_or(0.0),
            timestamp: raw.timestamp.unwrap_or(received_at),
            horizontal_accuracy: raw.accuracy.filter(|a| a.is_finite()),
        }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

/// Ordered sequence of admitted samples, oldest first
pub type TrackPath = Vec<GeoSample>;

/// Lifecycle status of a recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionStatus {
    #[default]
    Idle,
    Recording,
    Paused,
    Stopped,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStatus::Idle => "Idle",
            SessionStatus::Recording => "Recording",
            SessionStatus::Paused => "Paused",
            SessionStatus::Stopped => "Stopped",
        };
        f.write_str(s)
    }
}

/// Frozen view of a session, produced by `SessionAccumulator::stop`
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub start_time: i64,
    pub end_time: i64,
    pub elapsed_ms: i64,
    pub path: TrackPath,
    pub distance_meters: f64,
    pub heart_rate_samples: Vec<u32>,
}

/// Live metrics recomputed on request
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DerivedMetrics {
    pub elapsed_ms: i64,
    pub distance_meters: f64,

    /// Seconds per kilometer, `None` while undefined
    pub average_pace_sec_per_km: Option<f64>,

    /// Seconds per kilometer over the trailing window, `None` while undefined
    pub current_pace_sec_per_km: Option<f64>,

    pub elevation_gain_meters: f64,
    pub calories_kcal: u32,
    pub average_heart_rate_bpm: u32,

    /// Most recent heart-rate sample, 0 before the first one
    pub current_heart_rate_bpm: u32,
}

/// Finalized record of one session.
///
/// Field names are the storage contract and serialize in camelCase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub start_time: i64,
    pub end_time: i64,
    pub duration_ms: i64,
    pub distance_meters: f64,
    pub calories_kcal: u32,
    pub pace_string: String,
    pub path: TrackPath,
    pub heart_rate_samples: Vec<u32>,
    pub average_heart_rate_bpm: u32,
    pub elevation_gain_meters: f64,
}

/// An activity as held by the store, with its storage id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredActivity {
    pub id: String,
    #[serde(flatten)]
    pub activity: Activity,
}

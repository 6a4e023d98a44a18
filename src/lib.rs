// Library interface for TrackRS modules
// The binary and the integration tests both go through this crate

pub mod config;
pub mod database;
pub mod error;
pub mod export;
pub mod formatters;
pub mod geo;
pub mod heart_rate;
pub mod import;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod session;
pub mod tracker;

// Re-export commonly used types for convenience
pub use models::*;
pub use config::AppConfig;
pub use database::{ActivityStore, Database, InMemoryStore};
pub use error::{DatabaseError, ImportError, Result, TrackRsError};
pub use heart_rate::{HeartRateSimulator, HeartRateSource};
pub use logging::{LogConfig, LogFormat, LogLevel};
pub use session::{
    Clock, ManualClock, RejectReason, SampleFilter, SampleOutcome, SessionAccumulator, SystemClock,
};
pub use tracker::{
    ActivityTracker, FinishedActivity, LocationOptions, LocationProvider, LocationSubscription,
    TrackerEvent,
};

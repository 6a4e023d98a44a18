//! Location provider that plays back a recorded track

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

use crate::error::Result;
use crate::models::RawLocation;
use crate::session::ManualClock;
use crate::tracker::{LocationOptions, LocationProvider, LocationSubscription};

const CHANNEL_CAPACITY: usize = 64;

/// Feeds an imported track to a tracker as if it were a live GPS stream.
///
/// Gaps between fix timestamps are replayed divided by `speed`; a
/// non-positive or non-finite speed delivers everything at once. When a
/// clock is attached it is moved to each fix's timestamp before delivery, so
/// session times follow the recording rather than the wall clock.
pub struct ReplayProvider {
    track: Vec<RawLocation>,
    speed: f64,
    clock: Option<ManualClock>,
}

impl ReplayProvider {
    pub fn new(track: Vec<RawLocation>, speed: f64) -> Self {
        Self {
            track,
            speed,
            clock: None,
        }
    }

    pub fn with_clock(mut self, clock: ManualClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Timestamp of the first timed fix
    pub fn start_time(&self) -> Option<i64> {
        self.track.iter().find_map(|raw| raw.timestamp)
    }

    pub fn len(&self) -> usize {
        self.track.len()
    }

    pub fn is_empty(&self) -> bool {
        self.track.is_empty()
    }

    fn gap(&self, previous: i64, next: i64) -> Option<Duration> {
        if !(self.speed.is_finite() && self.speed > 0.0) {
            return None;
        }
        let millis = (next - previous).max(0) as f64 / self.speed;
        (millis > 0.0).then(|| Duration::from_secs_f64(millis / 1000.0))
    }
}

impl LocationProvider for ReplayProvider {
    fn permission_granted(&mut self) -> bool {
        true
    }

    /// Must be called from within a Tokio runtime
    fn subscribe(&mut self, _options: &LocationOptions) -> Result<LocationSubscription> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

        let mut schedule = Vec::with_capacity(self.track.len());
        let mut previous: Option<i64> = None;
        for raw in &self.track {
            let delay = match (previous, raw.timestamp) {
                (Some(prev), Some(ts)) => self.gap(prev, ts),
                _ => None,
            };
            if raw.timestamp.is_some() {
                previous = raw.timestamp;
            }
            schedule.push((delay, raw.clone()));
        }

        let clock = self.clock.clone();
        let handle = tokio::spawn(async move {
            for (delay, raw) in schedule {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                if let (Some(clock), Some(ts)) = (&clock, raw.timestamp) {
                    clock.set(ts);
                }
                if tx.send(raw).await.is_err() {
                    debug!("Replay receiver gone, stopping playback");
                    break;
                }
            }
        });

        Ok(LocationSubscription::new(rx, move || handle.abort()))
    }
}

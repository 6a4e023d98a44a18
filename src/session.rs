//! Recording session state machine
//!
//! [`SessionAccumulator`] owns the authoritative state of one session: the
//! admitted path, the running distance, pause bookkeeping and heart-rate
//! samples. It never performs I/O; `stop` hands back a [`SessionSnapshot`]
//! for the caller to persist.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::TrackingConfig;
use crate::error::{Result, TrackRsError};
use crate::geo;
use crate::models::{GeoSample, SessionSnapshot, SessionStatus, TrackPath};

/// Source of wall-clock time in milliseconds since the Unix epoch
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// Real time from the system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Manually driven clock; clones share the same time
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(start_ms)),
        }
    }

    pub fn set(&self, ms: i64) {
        self.now.store(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: i64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Thresholds deciding whether a GPS fix enters the path
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleFilter {
    /// Fixes with a larger accuracy radius are discarded
    pub max_horizontal_accuracy_meters: f64,
    /// Moves shorter than this are treated as jitter
    pub min_movement_meters: f64,
    /// Moves longer than this are treated as spurious fixes
    pub max_jump_meters: f64,
}

impl Default for SampleFilter {
    fn default() -> Self {
        Self {
            max_horizontal_accuracy_meters: 20.0,
            min_movement_meters: 1.0,
            max_jump_meters: 100.0,
        }
    }
}

impl From<&TrackingConfig> for SampleFilter {
    fn from(config: &TrackingConfig) -> Self {
        Self {
            max_horizontal_accuracy_meters: config.max_horizontal_accuracy_meters,
            min_movement_meters: config.min_movement_meters,
            max_jump_meters: config.max_jump_meters,
        }
    }
}

/// Why a sample was left out of the path
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RejectReason {
    NotRecording(SessionStatus),
    InvalidCoordinate { latitude: f64, longitude: f64 },
    LowAccuracy { accuracy_meters: f64 },
    OutOfOrder { last_timestamp: i64 },
    Jitter { distance_meters: f64 },
    ImplausibleJump { distance_meters: f64 },
}

/// Result of offering a sample to the accumulator
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleOutcome {
    /// Appended; carries the distance added to the running total
    Admitted { distance_meters: f64 },
    Rejected(RejectReason),
}

impl SampleOutcome {
    pub fn is_admitted(&self) -> bool {
        matches!(self, SampleOutcome::Admitted { .. })
    }
}

pub struct SessionAccumulator {
    clock: Arc<dyn Clock>,
    filter: SampleFilter,
    status: SessionStatus,
    start_time: Option<i64>,
    end_time: Option<i64>,
    pause_started_at: Option<i64>,
    accumulated_pause_ms: i64,
    frozen_elapsed_ms: Option<i64>,
    path: TrackPath,
    cumulative_distance_meters: f64,
    heart_rate_samples: Vec<u32>,
}

impl SessionAccumulator {
    pub fn new(clock: Arc<dyn Clock>, filter: SampleFilter) -> Self {
        Self {
            clock,
            filter,
            status: SessionStatus::Idle,
            start_time: None,
            end_time: None,
            pause_started_at: None,
            accumulated_pause_ms: 0,
            frozen_elapsed_ms: None,
            path: Vec::new(),
            cumulative_distance_meters: 0.0,
            heart_rate_samples: Vec::new(),
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn start_time(&self) -> Option<i64> {
        self.start_time
    }

    pub fn path(&self) -> &[GeoSample] {
        &self.path
    }

    pub fn cumulative_distance_meters(&self) -> f64 {
        self.cumulative_distance_meters
    }

    pub fn accumulated_pause_ms(&self) -> i64 {
        self.accumulated_pause_ms
    }

    pub fn heart_rate_samples(&self) -> &[u32] {
        &self.heart_rate_samples
    }

    pub fn filter(&self) -> &SampleFilter {
        &self.filter
    }

    fn invalid(&self, operation: &'static str) -> TrackRsError {
        TrackRsError::InvalidTransition {
            operation,
            from: self.status,
        }
    }

    fn clear(&mut self) {
        self.start_time = None;
        self.end_time = None;
        self.pause_started_at = None;
        self.accumulated_pause_ms = 0;
        self.frozen_elapsed_ms = None;
        self.path.clear();
        self.cumulative_distance_meters = 0.0;
        self.heart_rate_samples.clear();
    }

    /// Begin a new session from Idle or Stopped
    pub fn start(&mut self) -> Result<()> {
        if !matches!(self.status, SessionStatus::Idle | SessionStatus::Stopped) {
            return Err(self.invalid("start"));
        }

        self.clear();
        let now = self.clock.now_ms();
        self.start_time = Some(now);
        self.status = SessionStatus::Recording;
        info!(start_time = now, "Session started");
        Ok(())
    }

    pub fn pause(&mut self) -> Result<()> {
        if self.status != SessionStatus::Recording {
            return Err(self.invalid("pause"));
        }

        let now = self.clock.now_ms();
        self.pause_started_at = Some(now);
        self.status = SessionStatus::Paused;
        info!(at = now, "Session paused");
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        if self.status != SessionStatus::Paused {
            return Err(self.invalid("resume"));
        }

        let now = self.clock.now_ms();
        if let Some(paused_at) = self.pause_started_at.take() {
            self.accumulated_pause_ms += (now - paused_at).max(0);
        }
        self.status = SessionStatus::Recording;
        info!(
            at = now,
            accumulated_pause_ms = self.accumulated_pause_ms,
            "Session resumed"
        );
        Ok(())
    }

    /// Finish the session and freeze its elapsed time.
    ///
    /// Stopping while paused counts the open pause as paused time.
    pub fn stop(&mut self) -> Result<SessionSnapshot> {
        if !matches!(self.status, SessionStatus::Recording | SessionStatus::Paused) {
            return Err(self.invalid("stop"));
        }

        let now = self.clock.now_ms();
        let elapsed = self.elapsed_at(now);
        let start_time = self.start_time.unwrap_or(now);

        self.frozen_elapsed_ms = Some(elapsed);
        self.end_time = Some(now);
        self.pause_started_at = None;
        self.status = SessionStatus::Stopped;

        info!(
            elapsed_ms = elapsed,
            distance_meters = self.cumulative_distance_meters,
            samples = self.path.len(),
            "Session stopped"
        );

        Ok(SessionSnapshot {
            start_time,
            end_time: now,
            elapsed_ms: elapsed,
            path: self.path.clone(),
            distance_meters: self.cumulative_distance_meters,
            heart_rate_samples: self.heart_rate_samples.clone(),
        })
    }

    /// Current session contents without changing status
    pub fn snapshot(&self) -> SessionSnapshot {
        let now = self.clock.now_ms();
        SessionSnapshot {
            start_time: self.start_time.unwrap_or(now),
            end_time: self.end_time.unwrap_or(now),
            elapsed_ms: self.elapsed_at(now),
            path: self.path.clone(),
            distance_meters: self.cumulative_distance_meters,
            heart_rate_samples: self.heart_rate_samples.clone(),
        }
    }

    /// Return to Idle from any status, discarding the session
    pub fn reset(&mut self) {
        self.clear();
        self.status = SessionStatus::Idle;
        debug!("Session reset");
    }

    /// Elapsed time net of pauses
    pub fn elapsed_ms(&self) -> i64 {
        self.elapsed_at(self.clock.now_ms())
    }

    fn elapsed_at(&self, now: i64) -> i64 {
        if let Some(frozen) = self.frozen_elapsed_ms {
            return frozen;
        }
        let Some(start) = self.start_time else {
            return 0;
        };
        let until = match self.status {
            SessionStatus::Paused => self.pause_started_at.unwrap_or(now),
            _ => now,
        };
        (until - start - self.accumulated_pause_ms).max(0)
    }

    /// Offer a GPS fix to the path.
    ///
    /// Accuracy is checked before distance so one bad fix can neither enter
    /// the path nor skew the distance to the next good one.
    pub fn admit_sample(&mut self, sample: GeoSample) -> SampleOutcome {
        let outcome = self.evaluate(&sample);

        match outcome {
            SampleOutcome::Admitted { distance_meters } => {
                self.cumulative_distance_meters += distance_meters;
                self.path.push(sample);
            }
            SampleOutcome::Rejected(reason) => {
                debug!(?reason, timestamp = sample.timestamp, "Sample rejected");
            }
        }

        outcome
    }

    fn evaluate(&self, sample: &GeoSample) -> SampleOutcome {
        if self.status != SessionStatus::Recording {
            return SampleOutcome::Rejected(RejectReason::NotRecording(self.status));
        }

        if !sample.coordinate().is_valid() {
            return SampleOutcome::Rejected(RejectReason::InvalidCoordinate {
                latitude: sample.latitude,
                longitude: sample.longitude,
            });
        }

        if let Some(accuracy) = sample.horizontal_accuracy {
            if accuracy > self.filter.max_horizontal_accuracy_meters {
                return SampleOutcome::Rejected(RejectReason::LowAccuracy {
                    accuracy_meters: accuracy,
                });
            }
        }

        let Some(last) = self.path.last() else {
            return SampleOutcome::Admitted {
                distance_meters: 0.0,
            };
        };

        if sample.timestamp < last.timestamp {
            return SampleOutcome::Rejected(RejectReason::OutOfOrder {
                last_timestamp: last.timestamp,
            });
        }

        let d = geo::distance_meters(last.coordinate(), sample.coordinate());
        if d < self.filter.min_movement_meters {
            return SampleOutcome::Rejected(RejectReason::Jitter { distance_meters: d });
        }
        if d > self.filter.max_jump_meters {
            return SampleOutcome::Rejected(RejectReason::ImplausibleJump { distance_meters: d });
        }

        SampleOutcome::Admitted { distance_meters: d }
    }

    /// Append a heart-rate reading regardless of status
    pub fn record_heart_rate_sample(&mut self, bpm: u32) {
        self.heart_rate_samples.push(bpm);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accumulator() -> (SessionAccumulator, ManualClock) {
        let clock = ManualClock::new(0);
        let acc = SessionAccumulator::new(Arc::new(clock.clone()), SampleFilter::default());
        (acc, clock)
    }

    #[test]
    fn test_initial_state() {
        let (acc, _) = accumulator();
        assert_eq!(acc.status(), SessionStatus::Idle);
        assert_eq!(acc.elapsed_ms(), 0);
        assert!(acc.path().is_empty());
    }

    #[test]
    fn test_transitions() {
        let (mut acc, _) = accumulator();
        acc.start().unwrap();
        assert!(acc.start().is_err());
        acc.pause().unwrap();
        assert!(acc.pause().is_err());
        assert!(acc.start().is_err());
        acc.resume().unwrap();
        assert!(acc.resume().is_err());
        acc.stop().unwrap();
        assert!(acc.stop().is_err());
        assert!(acc.pause().is_err());
        acc.start().unwrap();
        assert_eq!(acc.status(), SessionStatus::Recording);
    }

    #[test]
    fn test_stop_from_idle_is_invalid() {
        let (mut acc, _) = accumulator();
        match acc.stop() {
            Err(TrackRsError::InvalidTransition { operation, from }) => {
                assert_eq!(operation, "stop");
                assert_eq!(from, SessionStatus::Idle);
            }
            other => panic!("expected InvalidTransition, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_pause_excluded_from_elapsed() {
        let (mut acc, clock) = accumulator();
        acc.start().unwrap();
        clock.advance(10_000);
        acc.pause().unwrap();
        clock.advance(4_000);
        // Frozen while paused
        assert_eq!(acc.elapsed_ms(), 10_000);
        acc.resume().unwrap();
        assert_eq!(acc.accumulated_pause_ms(), 4_000);
        clock.advance(6_000);

        let snapshot = acc.stop().unwrap();
        assert_eq!(snapshot.elapsed_ms, 16_000);
        assert_eq!(snapshot.end_time - snapshot.start_time, 20_000);

        clock.advance(50_000);
        assert_eq!(acc.elapsed_ms(), 16_000);
        assert_eq!(acc.snapshot(), snapshot);
    }

    #[test]
    fn test_stop_while_paused_counts_open_pause() {
        let (mut acc, clock) = accumulator();
        acc.start().unwrap();
        clock.advance(3_000);
        acc.pause().unwrap();
        clock.advance(7_000);
        let snapshot = acc.stop().unwrap();
        assert_eq!(snapshot.elapsed_ms, 3_000);
        assert_eq!(acc.accumulated_pause_ms(), 0);
    }

    #[test]
    fn test_samples_rejected_unless_recording() {
        let (mut acc, _) = accumulator();
        let sample = GeoSample::new(0.0, 0.0, 0.0, 0);
        assert_eq!(
            acc.admit_sample(sample),
            SampleOutcome::Rejected(RejectReason::NotRecording(SessionStatus::Idle))
        );

        acc.start().unwrap();
        acc.pause().unwrap();
        assert!(!acc.admit_sample(sample).is_admitted());
        assert!(acc.path().is_empty());
    }

    #[test]
    fn test_low_accuracy_rejected() {
        let (mut acc, _) = accumulator();
        acc.start().unwrap();
        acc.admit_sample(GeoSample::new(0.0, 0.0, 0.0, 0));

        let outcome = acc.admit_sample(GeoSample::new(0.0, 0.0002, 0.0, 1000).with_accuracy(25.0));
        assert_eq!(
            outcome,
            SampleOutcome::Rejected(RejectReason::LowAccuracy {
                accuracy_meters: 25.0
            })
        );
        assert_eq!(acc.path().len(), 1);
        assert_eq!(acc.cumulative_distance_meters(), 0.0);

        // Exactly at the limit is accepted
        assert!(acc
            .admit_sample(GeoSample::new(0.0, 0.0002, 0.0, 2000).with_accuracy(20.0))
            .is_admitted());
    }

    #[test]
    fn test_jitter_and_jump_rejected() {
        let (mut acc, _) = accumulator();
        acc.start().unwrap();
        acc.admit_sample(GeoSample::new(0.0, 0.0, 0.0, 0));

        // ~0.1 m
        let jitter = acc.admit_sample(GeoSample::new(0.0, 0.000001, 0.0, 1000));
        assert!(matches!(jitter, SampleOutcome::Rejected(RejectReason::Jitter { .. })));

        // ~1.1 km
        let jump = acc.admit_sample(GeoSample::new(0.0, 0.01, 0.0, 2000));
        assert!(matches!(
            jump,
            SampleOutcome::Rejected(RejectReason::ImplausibleJump { .. })
        ));

        assert_eq!(acc.path().len(), 1);
        assert_eq!(acc.cumulative_distance_meters(), 0.0);
    }

    #[test]
    fn test_non_finite_coordinates_rejected() {
        let (mut acc, _) = accumulator();
        acc.start().unwrap();

        // First fix of the session goes through the same check
        let outcome = acc.admit_sample(GeoSample::new(f64::NAN, 0.0, 0.0, 0));
        assert!(matches!(
            outcome,
            SampleOutcome::Rejected(RejectReason::InvalidCoordinate { .. })
        ));
        assert!(acc.path().is_empty());

        acc.admit_sample(GeoSample::new(0.0, 0.0, 0.0, 0));
        for bad in [
            GeoSample::new(f64::NAN, 0.0, 0.0, 1_000),
            GeoSample::new(0.0, f64::INFINITY, 0.0, 2_000),
            GeoSample::new(91.0, 0.0, 0.0, 3_000),
            GeoSample::new(0.0, -180.5, 0.0, 4_000),
        ] {
            assert!(matches!(
                acc.admit_sample(bad),
                SampleOutcome::Rejected(RejectReason::InvalidCoordinate { .. })
            ));
        }

        assert_eq!(acc.path().len(), 1);
        assert_eq!(acc.cumulative_distance_meters(), 0.0);

        let outcome = acc.admit_sample(GeoSample::new(0.0, 0.0002, 0.0, 5_000));
        assert!(outcome.is_admitted());
        let distance = acc.cumulative_distance_meters();
        assert!(distance.is_finite() && distance > 20.0);
    }

    #[test]
    fn test_out_of_order_rejected() {
        let (mut acc, _) = accumulator();
        acc.start().unwrap();
        acc.admit_sample(GeoSample::new(0.0, 0.0, 0.0, 5_000));
        let outcome = acc.admit_sample(GeoSample::new(0.0, 0.0002, 0.0, 4_000));
        assert_eq!(
            outcome,
            SampleOutcome::Rejected(RejectReason::OutOfOrder {
                last_timestamp: 5_000
            })
        );
    }

    #[test]
    fn test_distance_accumulates_incrementally() {
        let (mut acc, _) = accumulator();
        acc.start().unwrap();
        let p0 = GeoSample::new(0.0, 0.0, 0.0, 0);
        let p1 = GeoSample::new(0.0, 0.0005, 0.0, 1000);
        let p2 = GeoSample::new(0.0003, 0.0005, 0.0, 2000);

        for p in [p0, p1, p2] {
            assert!(acc.admit_sample(p).is_admitted());
        }

        let expected = geo::distance_meters(p0.coordinate(), p1.coordinate())
            + geo::distance_meters(p1.coordinate(), p2.coordinate());
        assert!((acc.cumulative_distance_meters() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_heart_rate_recorded_in_any_status() {
        let (mut acc, _) = accumulator();
        acc.record_heart_rate_sample(130);
        acc.start().unwrap();
        acc.record_heart_rate_sample(140);
        acc.pause().unwrap();
        acc.record_heart_rate_sample(141);
        assert_eq!(acc.heart_rate_samples(), &[140, 141]);
    }

    #[test]
    fn test_reset_clears_everything() {
        let (mut acc, clock) = accumulator();
        acc.start().unwrap();
        acc.admit_sample(GeoSample::new(0.0, 0.0, 0.0, 0));
        acc.record_heart_rate_sample(150);
        acc.pause().unwrap();
        clock.advance(1_000);
        acc.resume().unwrap();
        acc.stop().unwrap();

        acc.reset();
        assert_eq!(acc.status(), SessionStatus::Idle);
        assert!(acc.path().is_empty());
        assert!(acc.heart_rate_samples().is_empty());
        assert_eq!(acc.accumulated_pause_ms(), 0);
        assert_eq!(acc.cumulative_distance_meters(), 0.0);
        assert!(acc.start().is_ok());
    }
}

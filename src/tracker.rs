//! Live recording runtime
//!
//! [`ActivityTracker`] wires a [`SessionAccumulator`] to its collaborators: a
//! location provider, the periodic timers, a heart-rate source and an
//! activity store. It is driven from a single task by awaiting
//! [`ActivityTracker::next_event`]; nothing here spawns or locks.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::{AppConfig, TrackingConfig};
use crate::database::ActivityStore;
use crate::error::{Result, TrackRsError};
use crate::heart_rate::{HeartRateSimulator, HeartRateSource};
use crate::models::{Activity, DerivedMetrics, GeoSample, RawLocation, SessionStatus};
use crate::session::{Clock, SampleFilter, SampleOutcome, SessionAccumulator};

/// Subscription parameters handed to the location provider
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationOptions {
    pub interval_ms: u64,
    pub distance_filter_meters: f64,
    pub high_accuracy: bool,
}

impl From<&TrackingConfig> for LocationOptions {
    fn from(config: &TrackingConfig) -> Self {
        Self {
            interval_ms: config.location_interval_ms,
            distance_filter_meters: config.location_distance_filter_meters,
            high_accuracy: true,
        }
    }
}

/// Source of raw location fixes
pub trait LocationProvider {
    /// Whether location access has been granted
    fn permission_granted(&mut self) -> bool;

    /// Open a stream of fixes; the stream stays open until the returned
    /// handle is released
    fn subscribe(&mut self, options: &LocationOptions) -> Result<LocationSubscription>;
}

/// Handle on an open location stream.
///
/// Releasing runs the provider's hook once; dropping the handle releases it.
pub struct LocationSubscription {
    receiver: mpsc::Receiver<RawLocation>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl LocationSubscription {
    pub fn new<F>(receiver: mpsc::Receiver<RawLocation>, release: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            receiver,
            release: Some(Box::new(release)),
        }
    }

    /// Next fix, or `None` once the provider has closed the stream
    pub async fn recv(&mut self) -> Option<RawLocation> {
        self.receiver.recv().await
    }

    pub fn is_released(&self) -> bool {
        self.release.is_none()
    }

    /// Stop the stream. Safe to call more than once.
    pub fn unsubscribe(&mut self) {
        if let Some(release) = self.release.take() {
            self.receiver.close();
            release();
            debug!("Location subscription released");
        }
    }
}

impl Drop for LocationSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for LocationSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationSubscription")
            .field("released", &self.is_released())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    Tick,
    HeartRate,
}

/// Periodic timers of a live session. Dropping the value cancels them.
#[derive(Debug)]
struct SessionTimers {
    tick: Option<Interval>,
    heart_rate: Option<Interval>,
}

fn periodic(period_ms: u64) -> Interval {
    let period = Duration::from_millis(period_ms.max(1));
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn wait(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

impl SessionTimers {
    /// Must be called from within a Tokio runtime
    fn start(config: &TrackingConfig) -> Self {
        Self {
            tick: Some(periodic(config.tick_interval_ms)),
            heart_rate: Some(periodic(config.heart_rate_interval_ms)),
        }
    }

    /// Timers that keep running while paused, if any
    fn paused(mut self, keep_heart_rate: bool) -> Option<Self> {
        self.tick = None;
        if !keep_heart_rate {
            self.heart_rate = None;
        }
        self.heart_rate.is_some().then_some(self)
    }

    async fn next(&mut self) -> TimerKind {
        tokio::select! {
            biased;
            _ = wait(&mut self.heart_rate) => TimerKind::HeartRate,
            _ = wait(&mut self.tick) => TimerKind::Tick,
        }
    }
}

/// Something the tracker reacted to
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerEvent {
    /// A fix arrived and was admitted or rejected
    Sample {
        sample: GeoSample,
        outcome: SampleOutcome,
    },
    /// Elapsed-time refresh with freshly computed metrics
    Tick(DerivedMetrics),
    /// A heart-rate reading was recorded
    HeartRate(u32),
    /// The provider ended the location stream
    LocationClosed,
}

/// Activity produced by a successful stop
#[derive(Debug, Clone, PartialEq)]
pub struct FinishedActivity {
    pub activity: Activity,
    /// Store id; `None` when the session had no admitted samples and
    /// nothing was saved
    pub id: Option<String>,
}

enum Wake {
    Location(Option<RawLocation>),
    Timer(TimerKind),
}

async fn next_location(subscription: &mut Option<LocationSubscription>) -> Option<RawLocation> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_timer(timers: &mut Option<SessionTimers>) -> TimerKind {
    match timers {
        Some(timers) => timers.next().await,
        None => std::future::pending().await,
    }
}

type SampleListener = Box<dyn FnMut(&GeoSample) + Send>;

/// Session controls plus the event loop around one accumulator
pub struct ActivityTracker<P: LocationProvider, S: ActivityStore> {
    accumulator: SessionAccumulator,
    clock: Arc<dyn Clock>,
    provider: P,
    store: S,
    heart_rate: Box<dyn HeartRateSource>,
    config: TrackingConfig,
    weight_kg: f64,
    subscription: Option<LocationSubscription>,
    timers: Option<SessionTimers>,
    pending: Vec<Activity>,
    listeners: Vec<SampleListener>,
}

impl<P: LocationProvider, S: ActivityStore> ActivityTracker<P, S> {
    pub fn new(provider: P, store: S, clock: Arc<dyn Clock>, config: &AppConfig) -> Self {
        Self {
            accumulator: SessionAccumulator::new(
                Arc::clone(&clock),
                SampleFilter::from(&config.tracking),
            ),
            clock,
            provider,
            store,
            heart_rate: Box::new(HeartRateSimulator::new()),
            config: config.tracking.clone(),
            weight_kg: config.athlete.weight_kg,
            subscription: None,
            timers: None,
            pending: Vec::new(),
            listeners: Vec::new(),
        }
    }

    /// Replace the default simulated heart-rate source
    pub fn with_heart_rate_source(mut self, source: Box<dyn HeartRateSource>) -> Self {
        self.heart_rate = source;
        self
    }

    /// Register a callback run for every admitted sample
    pub fn add_sample_listener<F>(&mut self, listener: F)
    where
        F: FnMut(&GeoSample) + Send + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    pub fn status(&self) -> SessionStatus {
        self.accumulator.status()
    }

    pub fn accumulator(&self) -> &SessionAccumulator {
        &self.accumulator
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    /// Activity whose save failed and is awaiting a retry or dismissal
    /// Activities whose save failed, oldest first
    pub fn pending_activities(&self) -> &[Activity] {
        &self.pending
    }

    /// Live metrics, recomputed on every call
    pub fn metrics(&self) -> DerivedMetrics {
        DerivedMetrics::compute(
            self.accumulator.elapsed_ms(),
            self.accumulator.cumulative_distance_meters(),
            self.accumulator.path(),
            self.accumulator.heart_rate_samples(),
            self.weight_kg,
        )
    }

    /// Start recording. Must be called from within a Tokio runtime.
    pub fn start(&mut self) -> Result<()> {
        if !matches!(self.status(), SessionStatus::Idle | SessionStatus::Stopped) {
            return Err(TrackRsError::InvalidTransition {
                operation: "start",
                from: self.status(),
            });
        }
        if !self.provider.permission_granted() {
            warn!("Location permission denied, session not started");
            return Err(TrackRsError::PermissionDenied);
        }

        // Start time is taken before the provider can deliver anything
        self.accumulator.start()?;
        let subscription = match self.provider.subscribe(&LocationOptions::from(&self.config)) {
            Ok(subscription) => subscription,
            Err(err) => {
                self.accumulator.reset();
                return Err(err);
            }
        };
        self.subscription = Some(subscription);
        self.timers = Some(SessionTimers::start(&self.config));
        Ok(())
    }

    pub fn pause(&mut self) -> Result<()> {
        self.accumulator.pause()?;
        self.timers = self
            .timers
            .take()
            .and_then(|timers| timers.paused(self.config.sample_heart_rate_while_paused));
        Ok(())
    }

    /// Resume recording. Must be called from within a Tokio runtime.
    pub fn resume(&mut self) -> Result<()> {
        self.accumulator.resume()?;
        self.timers = Some(SessionTimers::start(&self.config));
        Ok(())
    }

    /// Finish the session, release the location stream and save the
    /// activity.
    ///
    /// If the save fails the activity is queued behind any earlier
    /// pending ones and the persistence error is returned; the session
    /// still ends.
    pub fn stop(&mut self) -> Result<FinishedActivity> {
        let snapshot = self.accumulator.stop()?;
        self.release_resources();

        let activity = Activity::from_snapshot(snapshot, self.weight_kg);
        if activity.path.is_empty() {
            info!("No samples admitted, activity not saved");
            return Ok(FinishedActivity { activity, id: None });
        }

        match self.store.save_activity(&activity) {
            Ok(id) => Ok(FinishedActivity {
                activity,
                id: Some(id),
            }),
            Err(err) => {
                self.pending.push(activity);
                warn!(
                    error = %err,
                    pending = self.pending.len(),
                    "Failed to save activity, keeping it pending"
                );
                Err(err.into())
            }
        }
    }

    /// Save pending activities again, oldest first, and return their ids.
    ///
    /// Stops at the first failure; activities saved before it leave the
    /// queue, the rest stay pending.
    pub fn retry_save(&mut self) -> Result<Vec<String>> {
        let mut ids = Vec::with_capacity(self.pending.len());
        while let Some(activity) = self.pending.first() {
            let id = self.store.save_activity(activity)?;
            self.pending.remove(0);
            info!(id = %id, remaining = self.pending.len(), "Pending activity saved");
            ids.push(id);
        }
        Ok(ids)
    }

    /// Drop every pending activity without saving it
    pub fn dismiss_pending(&mut self) -> Vec<Activity> {
        let dismissed = std::mem::take(&mut self.pending);
        if !dismissed.is_empty() {
            info!(count = dismissed.len(), "Pending activities dismissed");
        }
        dismissed
    }

    /// Discard the current session from any status
    pub fn reset(&mut self) {
        self.release_resources();
        self.accumulator.reset();
    }

    fn release_resources(&mut self) {
        self.timers = None;
        if let Some(mut subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }

    /// Wait for the next location fix or timer and apply it.
    ///
    /// Returns `None` when nothing is left to wait on.
    pub async fn next_event(&mut self) -> Option<TrackerEvent> {
        if self.subscription.is_none() && self.timers.is_none() {
            return None;
        }

        let wake = tokio::select! {
            biased;
            raw = next_location(&mut self.subscription) => Wake::Location(raw),
            kind = next_timer(&mut self.timers) => Wake::Timer(kind),
        };

        Some(match wake {
            Wake::Location(Some(raw)) => self.handle_location(&raw),
            Wake::Location(None) => {
                debug!("Location stream closed by provider");
                self.subscription = None;
                TrackerEvent::LocationClosed
            }
            Wake::Timer(TimerKind::Tick) => TrackerEvent::Tick(self.metrics()),
            Wake::Timer(TimerKind::HeartRate) => TrackerEvent::HeartRate(self.sample_heart_rate()),
        })
    }

    fn handle_location(&mut self, raw: &RawLocation) -> TrackerEvent {
        let sample = GeoSample::from_raw(raw, self.clock.now_ms());
        let outcome = self.accumulator.admit_sample(sample);
        if outcome.is_admitted() {
            for listener in &mut self.listeners {
                listener(&sample);
            }
        }
        TrackerEvent::Sample { sample, outcome }
    }

    fn sample_heart_rate(&mut self) -> u32 {
        let last = self
            .accumulator
            .heart_rate_samples()
            .last()
            .copied()
            .unwrap_or(self.config.initial_heart_rate_bpm);
        let bpm = self.heart_rate.next_sample(last);
        self.accumulator.record_heart_rate_sample(bpm);
        bpm
    }
}

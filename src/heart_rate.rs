//! Heart-rate sources
//!
//! There is no sensor integration; the default source is a bounded random
//! walk. Metrics only ever see a sequence of bpm values, so a real sensor can
//! replace the simulator by implementing [`HeartRateSource`].

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Lower bound of the simulated range
pub const MIN_SIMULATED_BPM: u32 = 120;

/// Upper bound of the simulated range
pub const MAX_SIMULATED_BPM: u32 = 180;

/// Largest change between two consecutive simulated samples
pub const MAX_STEP_BPM: f64 = 5.0;

/// Something that produces the next heart-rate reading
pub trait HeartRateSource: Send {
    /// Next reading given the previous one
    fn next_sample(&mut self, last_bpm: u32) -> u32;
}

/// Random-walk heart rate clamped to [`MIN_SIMULATED_BPM`, `MAX_SIMULATED_BPM`]
#[derive(Debug)]
pub struct HeartRateSimulator {
    rng: StdRng,
}

impl HeartRateSimulator {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_rng(&mut rand::rng()),
        }
    }

    /// Deterministic simulator for tests and replays
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for HeartRateSimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl HeartRateSource for HeartRateSimulator {
    fn next_sample(&mut self, last_bpm: u32) -> u32 {
        let step: f64 = self.rng.random_range(-MAX_STEP_BPM..=MAX_STEP_BPM);
        let next = (f64::from(last_bpm) + step)
            .clamp(f64::from(MIN_SIMULATED_BPM), f64::from(MAX_SIMULATED_BPM));
        next.round() as u32
    }
}

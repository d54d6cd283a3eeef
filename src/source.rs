//! Sample sources.
//!
//! The dashboard pulls one [`Sample`] per tick from a [`SampleSource`]. This
//! build ships a uniform random generator standing in for real sensors; a
//! device reader would implement the same trait.

use chrono::{DateTime, Local};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::models::{Parameter, Sample};

// ---

pub trait SampleSource: Send {
    /// Produce a complete sample stamped with `at`.
    fn next_sample(&mut self, at: DateTime<Local>) -> Sample;
}

/// Simulation range per parameter, indexed by [`Parameter::index`].
pub const SIMULATION_RANGES: [(f64, f64); Parameter::COUNT] = [
    (22.0, 36.0),
    (40.0, 75.0),
    (980.0, 1025.0),
    (400.0, 1500.0),
    (10.0, 80.0),
    (25.0, 85.0),
];

/// Uniform random readings rounded to one decimal place.
pub struct RandomSampleSource {
    rng: StdRng,
}

impl RandomSampleSource {
    // ---
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl SampleSource for RandomSampleSource {
    fn next_sample(&mut self, at: DateTime<Local>) -> Sample {
        // ---
        let readings = SIMULATION_RANGES.map(|(lo, hi)| round1(self.rng.gen_range(lo..hi)));
        Sample::new(at, readings)
    }
}

/// Round to one decimal place.
pub fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

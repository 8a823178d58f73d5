//! Seeded Gaussian jitter - the only source of randomness in the physics.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

/// Gaussian noise generator shared by all physics updates of a run.
///
/// Physics functions stay pure; callers decide when a reading gets jitter
/// and route it through [`Noise::jitter`]. Seeding the generator makes a
/// whole run reproducible. A `scale` of 0 turns every jitter call into the
/// identity, which tests use to check exact trajectories.
#[derive(Debug, Clone)]
pub struct Noise {
    /// Deterministic RNG
    rng: ChaCha8Rng,

    /// Multiplier applied to every standard deviation
    scale: f64,
}

impl Noise {
    /// Creates a noise source seeded with `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            scale: 1.0,
        }
    }

    /// Creates a noise source whose jitter is always zero.
    pub fn silent(seed: u64) -> Self {
        Self::new(seed).with_scale(0.0)
    }

    /// Sets the standard-deviation multiplier (negative values count as 0).
    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale.max(0.0);
        self
    }

    /// Returns `value` plus a sample from N(0, std × scale).
    ///
    /// Non-finite or non-positive deviations return `value` unchanged.
    pub fn jitter(&mut self, value: f64, std: f64) -> f64 {
        let sigma = std * self.scale;
        if !(sigma > 0.0) || !sigma.is_finite() {
            return value;
        }
        match Normal::new(0.0, sigma) {
            Ok(dist) => value + dist.sample(&mut self.rng),
            Err(_) => value,
        }
    }

    /// Mutable access to the underlying RNG for seeded shuffles and picks.
    pub fn rng(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }
}

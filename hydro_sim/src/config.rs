//! Run configuration for the tick engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Pacing and seeding of one simulation run.
///
/// `interval` and `duration` are real (wall-clock) time; simulated time
/// advances by `interval × speed` per tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Simulated seconds per real second
    pub speed: f64,

    /// Real time between ticks
    pub interval: Duration,

    /// Real time to run before stopping
    pub duration: Duration,

    /// Real time between STATUS lines
    pub status_every: Duration,

    /// Budget for each connect/reconnect acknowledgement
    pub connect_timeout: Duration,

    /// Master seed (noise and scenario target selection)
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            speed: 1.0,
            interval: Duration::from_secs(5),
            duration: Duration::from_secs(3600),
            status_every: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
            seed: 42,
        }
    }
}

impl SimConfig {
    /// Sets the speed multiplier (non-finite or non-positive values fall back to 1).
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = if speed.is_finite() && speed > 0.0 { speed } else { 1.0 };
        self
    }

    /// Sets the tick interval in seconds (floored at 1 ms).
    pub fn with_interval_secs(mut self, secs: f64) -> Self {
        self.interval = secs_to_duration(secs).max(Duration::from_millis(1));
        self
    }

    /// Sets the run duration in seconds.
    pub fn with_duration_secs(mut self, secs: f64) -> Self {
        self.duration = secs_to_duration(secs);
        self
    }

    pub fn with_status_every(mut self, every: Duration) -> Self {
        self.status_every = every;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Simulated seconds covered by one tick.
    pub fn sim_step_secs(&self) -> f64 {
        self.interval.as_secs_f64() * self.speed
    }

    /// Seed for the physics noise stream.
    pub fn noise_seed(&self) -> u64 {
        self.seed.wrapping_mul(0x9e3779b97f4a7c15)
    }
}

fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}

use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::thread;
use std::time::Duration;

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Jittered pauses between scroll actions.
pub struct RateLimiter {
    rng: StdRng,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        RateLimiter {
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic sequence of pauses, for tests and reproducible runs.
    pub fn with_seed(seed: u64) -> Self {
        RateLimiter {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Uniform value in `[round(base - epsilon, 2), round(base + epsilon, 2)]`,
    /// rounded to two decimal places.
    pub fn next_pause(&mut self, base: f64, epsilon: f64) -> f64 {
        let lower = round2(base - epsilon);
        let upper = round2(base + epsilon);
        if lower >= upper {
            return lower;
        }
        round2(self.rng.gen_range(lower..=upper))
    }

    /// Sleeps for [`Self::next_pause`] seconds and returns the pause taken.
    pub fn pause(&mut self, base: f64, epsilon: f64, reason: &str) -> f64 {
        let secs = self.next_pause(base, epsilon);
        if secs > 0.0 {
            info!("Waiting for {:.2} seconds ({})...", secs, reason);
            thread::sleep(Duration::from_secs_f64(secs));
        }
        secs
    }
}

/// Fixed settle time between interactive steps.
pub fn settle(duration: Duration) {
    if !duration.is_zero() {
        thread::sleep(duration);
    }
}

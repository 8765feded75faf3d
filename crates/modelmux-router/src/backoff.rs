//! Retry backoff schedule.

use modelmux_core::config::RetryConfig;
use rand::Rng;
use std::time::Duration;

/// Iterator over retry delays: exponential doubling from the configured
/// base, jittered in both directions, capped at the configured maximum.
///
/// The schedule itself is unbounded; the attempt coordinator decides when
/// to stop drawing from it.
#[derive(Debug, Clone)]
pub struct BackoffSchedule {
    next_delay: Duration,
    max_delay: Duration,
    jitter_fraction: f64,
}

impl BackoffSchedule {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            next_delay: config.base_delay(),
            max_delay: config.max_delay(),
            jitter_fraction: config.jitter_fraction.clamp(0.0, 1.0),
        }
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter_fraction == 0.0 {
            return delay;
        }
        let spread = self.jitter_fraction;
        let factor = rand::rng().random_range(1.0 - spread..=1.0 + spread);
        delay.mul_f64(factor).min(self.max_delay)
    }
}

impl Iterator for BackoffSchedule {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let base = self.next_delay;
        self.next_delay = (base * 2).min(self.max_delay);
        Some(self.jittered(base))
    }
}

use crate::config::BackoffConfig;
use rand::Rng;
use std::time::Duration;

/// Bounded exponential backoff.
///
/// The n-th consecutive failure waits `initial * multiplier^n`, capped at
/// `max`. With jitter enabled up to a tenth of the delay is added at random,
/// still never exceeding `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    attempt: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Delay to wait before the next retry. Advances the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let delay = calculate_delay(&self.config, self.attempt);
        self.attempt = self.attempt.saturating_add(1);

        if !self.config.jitter || delay.is_zero() {
            return delay;
        }
        let spread = (delay.as_millis() / 10) as u64;
        if spread == 0 {
            return delay;
        }
        let extra = Duration::from_millis(rand::rng().random_range(0..=spread));
        (delay + extra).min(self.config.max)
    }

    /// Forget previous failures.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

/// Deterministic part of the delay for a given attempt.
pub fn calculate_delay(config: &BackoffConfig, attempt: u32) -> Duration {
    let factor = config.multiplier.max(1.0).powi(attempt.min(64) as i32);
    let millis = config.initial.as_millis() as f64 * factor;
    if !millis.is_finite() || millis >= config.max.as_millis() as f64 {
        return config.max;
    }
    Duration::from_millis(millis as u64)
}

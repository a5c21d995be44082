//! Reconnect delays with exponential backoff and jitter

use rand::Rng;
use std::time::Duration;

/// Reconnect delay policy.
///
/// `nominal_delay(n) = min(base_delay * 2^n, max_delay)`; the actual delay
/// adds up to `jitter_ratio * nominal` of random slack.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first reconnect
    pub base_delay: Duration,
    /// Upper bound on the nominal delay
    pub max_delay: Duration,
    /// Consecutive failures tolerated before giving up
    pub max_attempts: u32,
    /// Fraction of the nominal delay added as random jitter
    pub jitter_ratio: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 10,
            jitter_ratio: 0.25,
        }
    }
}

impl BackoffPolicy {
    /// Create the default policy
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the base delay
    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the maximum nominal delay
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the attempt limit
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set the jitter ratio (clamped to `0.0..=1.0`)
    #[must_use]
    pub fn with_jitter_ratio(mut self, ratio: f64) -> Self {
        self.jitter_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    /// Delay without jitter for the given zero-based attempt
    #[must_use]
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Delay with jitter for the given zero-based attempt
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let nominal = self.nominal_delay(attempt);
        let slack = nominal.as_secs_f64() * self.jitter_ratio;
        if slack <= 0.0 {
            return nominal;
        }
        let jitter = rand::thread_rng().gen_range(0.0..=slack);
        nominal + Duration::from_secs_f64(jitter)
    }
}

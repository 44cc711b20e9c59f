//! Delay schedules between retry attempts.

use std::fmt;
use std::time::Duration;

/// Ceiling applied to exponential delays unless configured otherwise.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Computes the pause before a retry.
pub trait Backoff: fmt::Debug + Send + Sync {
    /// Delay before retry number `retry`, where 0 is the pause between the
    /// first and second attempts.
    fn delay(&self, retry: u32) -> Duration;
}

/// Delay that starts at `initial` and is multiplied on every retry, up to `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: u32,
}

impl ExponentialBackoff {
    /// Doubling backoff starting at `initial`, capped at [`DEFAULT_MAX_DELAY`].
    pub fn new(initial: Duration) -> Self {
        Self {
            initial,
            max: DEFAULT_MAX_DELAY.max(initial),
            multiplier: 2,
        }
    }

    /// Set the ceiling. It never drops below the initial delay.
    pub fn with_max(mut self, max: Duration) -> Self {
        self.max = max.max(self.initial);
        self
    }

    /// Set the growth factor.
    pub fn with_multiplier(mut self, multiplier: u32) -> Self {
        self.multiplier = multiplier;
        self
    }
}

impl Backoff for ExponentialBackoff {
    fn delay(&self, retry: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(retry);
        self.initial.saturating_mul(factor).min(self.max)
    }
}

/// The same delay before every retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantBackoff {
    pub delay: Duration,
}

impl Backoff for ConstantBackoff {
    fn delay(&self, _retry: u32) -> Duration {
        self.delay
    }
}

/// Retry immediately.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoDelay;

impl Backoff for NoDelay {
    fn delay(&self, _retry: u32) -> Duration {
        Duration::ZERO
    }
}

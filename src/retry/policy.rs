//! Bounded retry loop with classification and cancellation-aware sleeps.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use super::backoff::{Backoff, ExponentialBackoff};
use crate::error::{ExecError, FailureClass};
use crate::execution::{DoneReason, ExecContext};

/// Errors that know whether retrying them could help.
pub trait Classify {
    fn failure_class(&self) -> FailureClass;
}

impl Classify for ExecError {
    fn failure_class(&self) -> FailureClass {
        self.class()
    }
}

/// Attempt budget plus delay schedule.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Pause before each retry.
    pub backoff: Arc<dyn Backoff>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(3, Duration::from_secs(1))
    }
}

impl RetryPolicy {
    /// Policy with a custom backoff.
    pub fn new(max_retries: u32, backoff: impl Backoff + 'static) -> Self {
        Self {
            max_retries,
            backoff: Arc::new(backoff),
        }
    }

    /// Doubling delays starting at `initial_delay`.
    pub fn exponential(max_retries: u32, initial_delay: Duration) -> Self {
        Self::new(max_retries, ExponentialBackoff::new(initial_delay))
    }

    /// A single attempt.
    pub fn none() -> Self {
        Self::new(0, super::NoDelay)
    }

    /// Total number of attempts allowed.
    pub fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// A failed attempt that is about to be retried.
#[derive(Debug)]
pub struct RetryAttempt<'a, E> {
    /// Zero-based index of the attempt that failed.
    pub index: u32,
    /// Pause before the next attempt.
    pub delay: Duration,
    /// Why the attempt failed.
    pub error: &'a E,
}

/// Why the retry loop gave up.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// An attempt failed in a way retrying cannot fix.
    #[error("{error}")]
    Aborted { attempts: u32, error: E },

    /// The context finished while waiting between attempts.
    #[error("retry interrupted after {attempts} attempts: {last}")]
    Interrupted {
        reason: DoneReason,
        attempts: u32,
        last: E,
    },

    /// Every attempt failed transiently.
    #[error("failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },
}

impl<E> RetryError<E> {
    /// Number of attempts that were made.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Aborted { attempts, .. }
            | Self::Interrupted { attempts, .. }
            | Self::Exhausted { attempts, .. } => *attempts,
        }
    }

    /// The error from the final attempt.
    pub fn into_last(self) -> E {
        match self {
            Self::Aborted { error, .. } => error,
            Self::Interrupted { last, .. } | Self::Exhausted { last, .. } => last,
        }
    }
}

/// Run `op` under `policy`.
///
/// See [`retry_observed`].
pub async fn retry<T, E, F, Fut>(
    ctx: &ExecContext,
    policy: &RetryPolicy,
    op: F,
) -> Result<T, RetryError<E>>
where
    E: Classify + std::fmt::Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    retry_observed(ctx, policy, op, |_| {}).await
}

/// Run `op` under `policy`, reporting every scheduled retry to `observe`.
///
/// `op` receives the zero-based attempt index. Permanent and canceled
/// failures end the loop at once. Transient failures are retried after the
/// backoff delay unless `ctx` finishes first, in which case the loop stops
/// without starting another attempt.
pub async fn retry_observed<T, E, F, Fut, O>(
    ctx: &ExecContext,
    policy: &RetryPolicy,
    mut op: F,
    mut observe: O,
) -> Result<T, RetryError<E>>
where
    E: Classify + std::fmt::Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    O: FnMut(&RetryAttempt<'_, E>),
{
    let attempts = policy.attempts();
    let mut index = 0;

    loop {
        let error = match op(index).await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        if error.failure_class() != FailureClass::Transient {
            return Err(RetryError::Aborted {
                attempts: index + 1,
                error,
            });
        }

        if index + 1 >= attempts {
            return Err(RetryError::Exhausted {
                attempts,
                last: error,
            });
        }

        let delay = policy.backoff.delay(index);
        warn!(
            attempt = index + 1,
            max_attempts = attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "attempt failed; retrying"
        );
        observe(&RetryAttempt {
            index,
            delay,
            error: &error,
        });

        tokio::select! {
            biased;
            reason = ctx.done() => {
                return Err(RetryError::Interrupted {
                    reason,
                    attempts: index + 1,
                    last: error,
                });
            }
            () = tokio::time::sleep(delay) => {}
        }

        index += 1;
    }
}

//! Retry with backoff.
//!
//! The loop is independent of process execution: it takes an attempt
//! budget, a backoff schedule and an [`ExecContext`](crate::ExecContext),
//! and stops early on permanent failures or when the context finishes.

mod backoff;
mod policy;

pub use backoff::{Backoff, ConstantBackoff, ExponentialBackoff, NoDelay, DEFAULT_MAX_DELAY};
pub use policy::{retry, retry_observed, Classify, RetryAttempt, RetryError, RetryPolicy};

//! Cancellation and deadline propagation.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why an [`ExecContext`] finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoneReason {
    /// `cancel()` was called on this context or an ancestor.
    Canceled,
    /// The deadline elapsed.
    DeadlineExceeded,
}

/// Carries an optional deadline and a cancellation signal through a call.
///
/// Cloning shares the same cancellation state. [`ExecContext::child`]
/// derives a context that is canceled with its parent and may carry a
/// tighter deadline.
#[derive(Debug, Clone)]
pub struct ExecContext {
    deadline: Option<Instant>,
    token: CancellationToken,
}

impl Default for ExecContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecContext {
    /// A context with no deadline that is never canceled unless asked to.
    pub fn new() -> Self {
        Self {
            deadline: None,
            token: CancellationToken::new(),
        }
    }

    /// A context that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// A context that expires at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            token: CancellationToken::new(),
        }
    }

    /// Wrap an existing cancellation token.
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            deadline: None,
            token,
        }
    }

    /// Derive a child context, optionally tightening the deadline.
    ///
    /// The child never outlives the parent's deadline.
    pub fn child(&self, timeout: Option<Duration>) -> Self {
        let requested = timeout.map(|t| Instant::now() + t);
        let deadline = match (self.deadline, requested) {
            (Some(parent), Some(child)) => Some(parent.min(child)),
            (parent, child) => parent.or(child),
        };

        Self {
            deadline,
            token: self.token.child_token(),
        }
    }

    /// Cancel this context and every child derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether `cancel()` has been called.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The absolute deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left until the deadline, if any. Zero once expired.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Whether the deadline has passed.
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Why the context is finished, if it is.
    pub fn done_reason(&self) -> Option<DoneReason> {
        if self.is_cancelled() {
            Some(DoneReason::Canceled)
        } else if self.is_expired() {
            Some(DoneReason::DeadlineExceeded)
        } else {
            None
        }
    }

    /// Resolves when the context is canceled or its deadline elapses.
    pub async fn done(&self) -> DoneReason {
        match self.deadline {
            Some(deadline) => tokio::select! {
                () = self.token.cancelled() => DoneReason::Canceled,
                () = tokio::time::sleep_until(deadline) => DoneReason::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                DoneReason::Canceled
            }
        }
    }

    /// Resolves only on explicit cancellation.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// The underlying cancellation token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

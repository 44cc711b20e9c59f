//! Task namespaces built on top of [`CommandRunner`](crate::runner::CommandRunner).
//!
//! Each namespace receives its runner at construction and decides only which
//! commands to run. Failures are wrapped with what the task was doing while
//! the underlying [`ExecError`] stays reachable as the source.

mod deps;
mod vet;

use thiserror::Error;

use crate::error::{ExecError, FailureClass};

pub use deps::Deps;
pub use vet::{Vet, VetFailure};

/// Error returned by task namespaces.
#[derive(Debug, Error)]
pub enum TaskError {
    /// A single command failed.
    #[error("failed to {action}: {source}")]
    Command {
        action: &'static str,
        #[source]
        source: ExecError,
    },

    /// One or more packages failed `go vet`.
    #[error("go vet failed for {} package(s): {}", .failures.len(), vet::package_list(.failures))]
    Vet { failures: Vec<VetFailure> },
}

impl TaskError {
    pub(crate) fn wrap(action: &'static str) -> impl FnOnce(ExecError) -> Self {
        move |source| Self::Command { action, source }
    }

    /// Classification of the underlying failure.
    ///
    /// For several failures, cancellation wins over transient, and transient
    /// wins over permanent.
    pub fn class(&self) -> FailureClass {
        match self {
            Self::Command { source, .. } => source.class(),
            Self::Vet { failures } => {
                let classes: Vec<_> = failures.iter().map(|f| f.error.class()).collect();
                if classes.contains(&FailureClass::Canceled) {
                    FailureClass::Canceled
                } else if classes.contains(&FailureClass::Transient) {
                    FailureClass::Transient
                } else {
                    FailureClass::Permanent
                }
            }
        }
    }
}

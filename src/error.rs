//! Error types for taskexec.

use std::time::Duration;

use thiserror::Error;

use crate::security::ValidationError;

/// How a failure should be treated by the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Retrying cannot help (missing executable, rejected command).
    Permanent,
    /// The process ran and failed; a later attempt may succeed.
    Transient,
    /// The caller's deadline elapsed or the work was canceled.
    Canceled,
}

/// Main error type for command execution.
#[derive(Error, Debug)]
pub enum ExecError {
    /// The security policy rejected the command before it was spawned.
    #[error("command validation failed for '{command}': {reason}")]
    Rejected {
        command: String,
        #[source]
        reason: ValidationError,
    },

    /// The executable could not be found.
    #[error("executable not found: {command}")]
    NotFound { command: String },

    /// The process could not be started for a reason other than a missing executable.
    #[error("failed to start '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The process ran and exited unsuccessfully.
    #[error("command '{command}' {}", describe_exit(.code))]
    Exited {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The deadline elapsed; the process (if any) was killed.
    #[error("command '{command}' {}", describe_timeout(.timeout))]
    TimedOut {
        command: String,
        timeout: Option<Duration>,
    },

    /// The caller canceled the work; the process (if any) was killed.
    #[error("command '{command}' was canceled")]
    Canceled { command: String },

    /// Every attempt failed with a transient error.
    #[error("command failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<ExecError>,
    },

    /// I/O error while waiting on the process or collecting its output.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exited with status {code}"),
        None => "was terminated by a signal".to_string(),
    }
}

fn describe_timeout(timeout: &Option<Duration>) -> String {
    match timeout {
        Some(timeout) => format!("exceeded timeout of {timeout:?}"),
        None => "exceeded its deadline".to_string(),
    }
}

/// Exit status a shell reports when the target exists but cannot be executed.
const EXIT_NOT_EXECUTABLE: i32 = 126;

/// Exit status a shell reports when the target cannot be found.
const EXIT_NOT_FOUND: i32 = 127;

impl ExecError {
    /// Classify this error for retry decisions.
    pub fn class(&self) -> FailureClass {
        match self {
            Self::Rejected { .. } | Self::NotFound { .. } | Self::Spawn { .. } => {
                FailureClass::Permanent
            }
            Self::Exited {
                code: Some(EXIT_NOT_EXECUTABLE | EXIT_NOT_FOUND),
                ..
            } => FailureClass::Permanent,
            Self::Exited { .. } | Self::Io(_) => FailureClass::Transient,
            Self::TimedOut { .. } | Self::Canceled { .. } => FailureClass::Canceled,
            Self::RetriesExhausted { last, .. } => last.class(),
        }
    }

    /// Whether retrying cannot fix this error.
    pub fn is_permanent(&self) -> bool {
        self.class() == FailureClass::Permanent
    }

    /// Whether this error is eligible for retry.
    pub fn is_transient(&self) -> bool {
        self.class() == FailureClass::Transient
    }

    /// Whether the work was stopped by a deadline or an explicit cancel.
    pub fn is_canceled(&self) -> bool {
        self.class() == FailureClass::Canceled
    }

    /// Whether a deadline (rather than an explicit cancel) stopped the work.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }

    /// Exit code of the failed process, if it exited on its own.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Exited { code, .. } => *code,
            Self::RetriesExhausted { last, .. } => last.exit_code(),
            _ => None,
        }
    }
}

/// Convenience Result type for taskexec operations.
pub type Result<T> = std::result::Result<T, ExecError>;

//! Execution result types.

use std::time::Duration;

/// Result of a successful command execution.
///
/// Failures are reported as [`crate::ExecError`]; an outcome always means
/// the process exited zero or the executor was in dry-run mode.
#[derive(Debug, Clone, Default)]
pub struct ExecutionOutcome {
    /// Raw stdout bytes, exactly as produced. Empty unless output was captured.
    pub raw_stdout: Vec<u8>,
    /// Stdout decoded as UTF-8 (lossy), untrimmed.
    pub stdout: String,
    /// Captured stderr, decoded lossily.
    pub stderr: String,
    /// Exit code (`None` under dry-run).
    pub exit_code: Option<i32>,
    /// Execution duration.
    pub duration: Duration,
    /// Whether the command was only logged, not spawned.
    pub dry_run: bool,
}

impl ExecutionOutcome {
    /// Create an outcome from captured streams.
    pub fn new(raw_stdout: Vec<u8>, stderr: Vec<u8>, exit_code: i32, duration: Duration) -> Self {
        let stdout = String::from_utf8_lossy(&raw_stdout).into_owned();
        Self {
            raw_stdout,
            stdout,
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            exit_code: Some(exit_code),
            duration,
            dry_run: false,
        }
    }

    /// The outcome reported for a command that was not spawned.
    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            ..Self::default()
        }
    }

    /// Get output as string, trimmed.
    pub fn output_trimmed(&self) -> &str {
        self.stdout.trim()
    }

    /// Get output lines.
    pub fn output_lines(&self) -> impl Iterator<Item = &str> {
        self.stdout.lines()
    }
}

//! # taskexec
//!
//! Secure command execution for build-automation tasks.
//!
//! Every external process goes through one path: a security policy check,
//! a timeout resolved from a per-command table and the caller's deadline,
//! a spawn that is killed on timeout or cancellation, and an error
//! classified as permanent, transient or canceled so that retry logic never
//! inspects message text.
//!
//! ## Features
//!
//! - **Pluggable validation**: reject disallowed executables and shell-shaped arguments
//! - **Timeout tiers**: generous budgets for `go test` or `goreleaser`, 30 s for the rest
//! - **Retry with backoff**: exponential, capped, and interrupted by cancellation
//! - **Dry-run**: log what would run, report success, spawn nothing
//! - **Injectable runners**: tasks depend on [`CommandRunner`], tests swap in [`MockRunner`]
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use taskexec::{ExecContext, SecureExecutor};
//!
//! #[tokio::main]
//! async fn main() -> taskexec::Result<()> {
//!     taskexec::logging::try_init("info").ok();
//!
//!     let executor = SecureExecutor::new();
//!     let ctx = ExecContext::with_timeout(Duration::from_secs(120));
//!
//!     executor
//!         .execute_with_retry(&ctx, 3, Duration::from_secs(1), "go", &["mod", "download"])
//!         .await?;
//!
//!     let out = executor.execute_output(&ctx, "git", &["rev-parse", "HEAD"]).await?;
//!     println!("HEAD is {}", out.trim());
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod execution;
pub mod logging;
pub mod retry;
pub mod runner;
pub mod security;
pub mod tasks;

// Re-export commonly used types
pub use error::{ExecError, FailureClass, Result};
pub use execution::{
    Command, DoneReason, ExecContext, ExecutionOutcome, SecureExecutor, TimeoutPolicy,
    TimeoutRule,
};
pub use retry::{RetryError, RetryPolicy};
pub use runner::{CommandRunner, MockRunner, RunnerHandle, SecureCommandRunner};
pub use security::{CommandPolicy, CommandValidator, EnvSanitizer, ValidationError};
pub use tasks::{Deps, TaskError, Vet};

//! Command execution engine.
//!
//! This module provides command execution capabilities:
//! - Validation through a pluggable [`CommandPolicy`](crate::security::CommandPolicy)
//! - Per-command timeout tiers capped by the caller's deadline
//! - Cancellation that kills the running process
//! - Dry-run mode that logs instead of spawning
//!
//! # Example
//!
//! ```no_run
//! use taskexec::execution::{ExecContext, SecureExecutor};
//!
//! # async fn demo() -> taskexec::Result<()> {
//! let executor = SecureExecutor::new();
//! let ctx = ExecContext::new();
//!
//! let version = executor.execute_output(&ctx, "go", &["version"]).await?;
//! println!("{}", version.trim());
//! # Ok(())
//! # }
//! ```

mod command;
mod context;
mod executor;
mod result;
mod timeout;

pub use command::Command;
pub use context::{DoneReason, ExecContext};
pub use executor::SecureExecutor;
pub use result::ExecutionOutcome;
pub use timeout::{ArgPattern, CommandPattern, TimeoutPolicy, TimeoutRule, DEFAULT_TIMEOUT};

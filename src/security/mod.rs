//! Security policy consulted before any process is spawned.
//!
//! ## Features
//!
//! - **Command policy**: a pluggable predicate over executable name and arguments
//! - **Default validator**: allow-list plus shell-injection shaped argument checks
//! - **Environment sanitizing**: credentials are withheld from child processes
//!
//! ## Example
//!
//! ```rust
//! use taskexec::security::{CommandPolicy, CommandValidator, ValidationConfig};
//!
//! let validator = CommandValidator::new(
//!     ValidationConfig::default().with_allowed_commands(["go", "git"]),
//! );
//! assert!(validator.check("go", &["build".to_string()]).is_ok());
//! assert!(validator.check("curl", &[]).is_err());
//! ```

pub mod env;
pub mod validation;

pub use env::EnvSanitizer;
pub use validation::{
    injection_pattern, sanitize_for_display, AllowAll, CommandPolicy, CommandValidator,
    ValidationConfig, ValidationError,
};

//! Logging initialization and configuration.
//!
//! Log output goes to stderr so that captured command output on stdout
//! stays byte-for-byte intact.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "taskexec=info";

const LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace", "off"];

/// Build a filter from a level name or a full directive.
///
/// A bare level such as `debug` applies to this crate only; anything else
/// (e.g. `taskexec=debug,tokio=warn`) is used as given.
pub fn filter_for(level: &str) -> EnvFilter {
    let level = level.trim();
    if LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
        EnvFilter::new(format!("taskexec={}", level.to_ascii_lowercase()))
    } else {
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }
}

/// Initialize the logging system.
///
/// Uses the `RUST_LOG` environment variable for filtering. If not set,
/// defaults to `taskexec=info`.
///
/// # Panics
///
/// Panics if called more than once, or if another tracing subscriber
/// has already been set.
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(std::io::stderr),
        )
        .init();
}

/// Try to initialize the logging system with the given level or directive.
///
/// Returns `Err` if logging has already been initialized.
pub fn try_init(level: &str) -> Result<(), tracing_subscriber::util::TryInitError> {
    tracing_subscriber::registry()
        .with(filter_for(level))
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(std::io::stderr),
        )
        .try_init()
}

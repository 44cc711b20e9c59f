//! Configuration management for taskexec.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file (JSON)
//! 4. Default values

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cli::Args;
use crate::execution::SecureExecutor;
use crate::retry::{ExponentialBackoff, RetryPolicy};
use crate::security::{CommandValidator, EnvSanitizer, ValidationConfig};

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Executor configuration.
    pub executor: ExecutorSection,
    /// Retry configuration.
    pub retry: RetrySection,
    /// Logging configuration.
    pub logging: LoggingSection,
}

/// Executor configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSection {
    /// Log commands instead of running them.
    pub dry_run: bool,
    /// Log every command before it runs.
    pub verbose: bool,
    /// Default working directory.
    pub working_dir: Option<PathBuf>,
    /// Executables allowed to run. Empty allows any.
    pub allowed_commands: Vec<String>,
    /// Withhold credentials from child environments.
    pub filter_sensitive_env: bool,
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            dry_run: false,
            verbose: false,
            working_dir: None,
            allowed_commands: Vec::new(),
            filter_sensitive_env: true,
        }
    }
}

/// Retry configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds.
    pub initial_delay_ms: u64,
    /// Ceiling on any single delay, in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace) or a full filter directive.
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        serde_json::from_str(&content).map_err(ConfigError::Json)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    fn apply_vars<F>(&mut self, var: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = var("TASKEXEC_DRY_RUN") {
            self.executor.dry_run = parse_bool("TASKEXEC_DRY_RUN", &value)?;
        }

        if let Some(value) = var("TASKEXEC_VERBOSE") {
            self.executor.verbose = parse_bool("TASKEXEC_VERBOSE", &value)?;
        }

        if let Some(dir) = var("TASKEXEC_WORKING_DIR") {
            if !dir.is_empty() {
                self.executor.working_dir = Some(PathBuf::from(dir));
            }
        }

        if let Some(list) = var("TASKEXEC_ALLOWED_COMMANDS") {
            self.executor.allowed_commands = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }

        if let Some(value) = var("TASKEXEC_MAX_RETRIES") {
            self.retry.max_retries = value
                .parse()
                .map_err(|_| ConfigError::InvalidValue("TASKEXEC_MAX_RETRIES", value))?;
        }

        if let Some(level) = var("TASKEXEC_LOG_LEVEL").or_else(|| var("RUST_LOG")) {
            self.logging.level = level;
        }

        Ok(())
    }

    /// Apply CLI argument overrides.
    pub fn apply_args(&mut self, args: &Args) {
        if args.dry_run {
            self.executor.dry_run = true;
        }

        if let Some(ref dir) = args.dir {
            self.executor.working_dir = Some(dir.clone());
        }

        if let Some(retries) = args.retries {
            self.retry.max_retries = retries;
        }

        if let Some(delay) = args.delay_ms {
            self.retry.initial_delay_ms = delay;
        }

        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let mut config = match args.config {
            Some(ref path) => Config::from_file(path)?,
            None => Config::default(),
        };

        config.apply_env()?;
        config.apply_args(args);

        Ok(config)
    }

    /// Build an executor from the executor section.
    pub fn to_executor(&self) -> SecureExecutor {
        let validation = ValidationConfig::default()
            .with_allowed_commands(self.executor.allowed_commands.iter().cloned());

        let env = if self.executor.filter_sensitive_env {
            EnvSanitizer::default()
        } else {
            EnvSanitizer::passthrough()
        };

        let mut executor = SecureExecutor::new()
            .with_policy(CommandValidator::new(validation))
            .with_env_sanitizer(env)
            .with_dry_run(self.executor.dry_run)
            .with_verbose(self.executor.verbose);

        if let Some(ref dir) = self.executor.working_dir {
            executor = executor.with_working_dir(dir);
        }

        executor
    }

    /// The retry schedule described by the retry section.
    pub fn retry_policy(&self) -> RetryPolicy {
        let backoff = ExponentialBackoff::new(Duration::from_millis(self.retry.initial_delay_ms))
            .with_max(Duration::from_millis(self.retry.max_delay_ms));
        RetryPolicy::new(self.retry.max_retries, backoff)
    }

    /// Get the log level filter string.
    pub fn log_filter(&self) -> &str {
        &self.logging.level
    }
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue(name, value.to_string())),
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    Io(std::io::Error),
    /// JSON parsing error.
    Json(serde_json::Error),
    /// An environment variable held an unusable value.
    InvalidValue(&'static str, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config file: {}", e),
            Self::Json(e) => write!(f, "failed to parse config file: {}", e),
            Self::InvalidValue(name, value) => write!(f, "invalid value for {}: '{}'", name, value),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Json(e) => Some(e),
            Self::InvalidValue(..) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::Backoff;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(!config.executor.dry_run);
        assert!(config.executor.filter_sensitive_env);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.initial_delay_ms, 1000);
        assert_eq!(config.log_filter(), "info");
    }

    #[test]
    fn test_config_from_json() {
        let json = r#"{
            "executor": {
                "dry_run": true,
                "allowed_commands": ["go", "git"]
            },
            "retry": {
                "max_retries": 5,
                "initial_delay_ms": 250
            }
        }"#;

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert!(config.executor.dry_run);
        assert_eq!(config.executor.allowed_commands, vec!["go", "git"]);
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.initial_delay_ms, 250);
        assert_eq!(config.retry.max_delay_ms, 30_000); // Default
    }

    #[test]
    fn test_invalid_json() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"{ not json").unwrap();

        let err = Config::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = Config::from_file(Path::new("/nonexistent/taskexec.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_vars(vars(&[
                ("TASKEXEC_DRY_RUN", "true"),
                ("TASKEXEC_VERBOSE", "1"),
                ("TASKEXEC_ALLOWED_COMMANDS", "go, git,,mage"),
                ("TASKEXEC_MAX_RETRIES", "7"),
                ("RUST_LOG", "taskexec=debug"),
            ]))
            .unwrap();

        assert!(config.executor.dry_run);
        assert!(config.executor.verbose);
        assert_eq!(config.executor.allowed_commands, vec!["go", "git", "mage"]);
        assert_eq!(config.retry.max_retries, 7);
        assert_eq!(config.log_filter(), "taskexec=debug");
    }

    #[test]
    fn test_log_level_env_beats_rust_log() {
        let mut config = Config::default();
        config
            .apply_vars(vars(&[
                ("TASKEXEC_LOG_LEVEL", "warn"),
                ("RUST_LOG", "trace"),
            ]))
            .unwrap();
        assert_eq!(config.log_filter(), "warn");
    }

    #[test]
    fn test_invalid_env_value() {
        let mut config = Config::default();
        let err = config
            .apply_vars(vars(&[("TASKEXEC_MAX_RETRIES", "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains("TASKEXEC_MAX_RETRIES"));

        let err = config
            .apply_vars(vars(&[("TASKEXEC_DRY_RUN", "maybe")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue("TASKEXEC_DRY_RUN", _)));
    }

    #[test]
    fn test_apply_args() {
        let mut config = Config::default();
        let args = Args {
            dry_run: true,
            retries: Some(2),
            delay_ms: Some(10),
            dir: Some(PathBuf::from("/work")),
            log_level: Some("debug".to_string()),
            ..Args::default()
        };

        config.apply_args(&args);

        assert!(config.executor.dry_run);
        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(config.retry.initial_delay_ms, 10);
        assert_eq!(config.executor.working_dir, Some(PathBuf::from("/work")));
        assert_eq!(config.log_filter(), "debug");
    }

    #[test]
    fn test_args_do_not_clear_file_settings() {
        let mut config = Config::default();
        config.executor.dry_run = true;

        config.apply_args(&Args::default());
        assert!(config.executor.dry_run);
    }

    #[test]
    fn test_to_executor() {
        let mut config = Config::default();
        config.executor.dry_run = true;

        let executor = config.to_executor();
        assert!(executor.is_dry_run());
    }

    #[test]
    fn test_retry_policy() {
        let mut config = Config::default();
        config.retry.initial_delay_ms = 100;
        config.retry.max_delay_ms = 300;

        let policy = config.retry_policy();
        assert_eq!(policy.attempts(), 4);
        assert_eq!(policy.backoff.delay(0), Duration::from_millis(100));
        assert_eq!(policy.backoff.delay(5), Duration::from_millis(300));
    }

    #[test]
    fn test_retry_policy_starts_at_initial_delay() {
        let mut config = Config::default();
        config.retry.initial_delay_ms = 60_000;

        let policy = config.retry_policy();
        assert_eq!(policy.backoff.delay(0), Duration::from_secs(60));

        config.retry.initial_delay_ms = 200;
        config.retry.max_delay_ms = 0;
        assert_eq!(config.retry_policy().backoff.delay(2), Duration::from_millis(200));
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        assert!(json.contains("\"dry_run\""));
        assert!(json.contains("\"max_retries\""));
    }
}

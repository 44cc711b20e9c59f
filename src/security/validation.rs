//! Command validation before spawning.

use std::collections::HashSet;

/// A predicate deciding whether a command may be executed.
///
/// The executor treats the policy as opaque: it only asks whether a given
/// executable name and argument vector are acceptable.
pub trait CommandPolicy: Send + Sync {
    /// Return `Ok(())` if the command may run.
    fn check(&self, name: &str, args: &[String]) -> Result<(), ValidationError>;
}

impl<F> CommandPolicy for F
where
    F: Fn(&str, &[String]) -> Result<(), ValidationError> + Send + Sync,
{
    fn check(&self, name: &str, args: &[String]) -> Result<(), ValidationError> {
        self(name, args)
    }
}

/// Policy that accepts every command.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl CommandPolicy for AllowAll {
    fn check(&self, _name: &str, _args: &[String]) -> Result<(), ValidationError> {
        Ok(())
    }
}

/// Validation configuration.
#[derive(Debug, Clone)]
pub struct ValidationConfig {
    /// Executables allowed to run. Empty means any executable is allowed.
    pub allowed_commands: HashSet<String>,
    /// Maximum length of a single argument in bytes.
    pub max_arg_length: usize,
    /// Maximum number of arguments.
    pub max_args: usize,
    /// Whether to reject shell-injection shaped arguments.
    pub block_injection: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            allowed_commands: HashSet::new(),
            max_arg_length: 32 * 1024,
            max_args: 4096,
            block_injection: true,
        }
    }
}

impl ValidationConfig {
    /// Create a permissive config (for trusted environments).
    pub fn permissive() -> Self {
        Self {
            max_arg_length: 1024 * 1024,
            max_args: 65536,
            block_injection: false,
            ..Self::default()
        }
    }

    /// Restrict execution to the given executables.
    pub fn with_allowed_commands<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_commands = commands.into_iter().map(Into::into).collect();
        self
    }
}

/// Default command validator.
#[derive(Debug, Default)]
pub struct CommandValidator {
    config: ValidationConfig,
}

impl CommandValidator {
    /// Create a new validator with the given config.
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Validate an executable name.
    pub fn validate_name(&self, name: &str) -> Result<(), ValidationError> {
        if name.trim().is_empty() {
            return Err(ValidationError::EmptyCommand);
        }

        if name.contains('\0') {
            return Err(ValidationError::InvalidCharacter('\0'));
        }

        if !self.config.allowed_commands.is_empty() && !self.config.allowed_commands.contains(name)
        {
            return Err(ValidationError::NotAllowed {
                command: name.to_string(),
            });
        }

        if name.contains("..") {
            return Err(ValidationError::PathTraversal);
        }

        Ok(())
    }

    /// Validate a single argument.
    pub fn validate_arg(&self, arg: &str) -> Result<(), ValidationError> {
        if arg.len() > self.config.max_arg_length {
            return Err(ValidationError::ArgumentTooLong {
                length: arg.len(),
                max: self.config.max_arg_length,
            });
        }

        if arg.contains('\0') {
            return Err(ValidationError::InvalidCharacter('\0'));
        }

        if self.config.block_injection {
            if let Some(pattern) = injection_pattern(arg) {
                return Err(ValidationError::DangerousArgument {
                    arg: sanitize_for_display(arg),
                    pattern,
                });
            }
        }

        Ok(())
    }

    /// Validate working directory path.
    pub fn validate_working_dir(&self, path: &str) -> Result<(), ValidationError> {
        if path.contains("..") {
            return Err(ValidationError::PathTraversal);
        }

        if path.contains('\0') {
            return Err(ValidationError::InvalidCharacter('\0'));
        }

        if path.len() > 4096 {
            return Err(ValidationError::PathTooLong {
                length: path.len(),
                max: 4096,
            });
        }

        Ok(())
    }
}

impl CommandPolicy for CommandValidator {
    fn check(&self, name: &str, args: &[String]) -> Result<(), ValidationError> {
        self.validate_name(name)?;

        if args.len() > self.config.max_args {
            return Err(ValidationError::TooManyArguments {
                count: args.len(),
                max: self.config.max_args,
            });
        }

        args.iter().try_for_each(|arg| self.validate_arg(arg))
    }
}

/// Argument fragments that only make sense to a shell.
///
/// Multi-character patterns come first so `||` is reported as itself rather
/// than as a pipe.
const INJECTION_PATTERNS: &[&str] = &["$(", "`", "&&", "||", ";", ">", "<", "${IFS}"];

/// Commands that betray shell piping when they follow a `|`.
const PIPE_TARGETS: &[&str] = &[
    "cat", "rm", "wget", "curl", "bash", "sh", "nc", "python", "perl", "ruby", "chmod", "chown",
    "mv", "cp", "dd", "head", "tail", "grep", "awk", "sed", "xargs", "find", "exec", "eval",
    "source", "env", "sudo",
];

/// Return the shell-injection pattern an argument contains, if any.
///
/// A bare `|` is tolerated in regular expressions and URLs, unless what
/// follows it looks like a piped command.
pub fn injection_pattern(arg: &str) -> Option<&'static str> {
    if let Some(pattern) = INJECTION_PATTERNS.iter().find(|p| arg.contains(**p)) {
        return Some(pattern);
    }

    if let Some(idx) = arg.find('|') {
        let is_regex = arg.chars().any(|c| "^$[]()+*?.{}\\".contains(c));
        let is_url = arg.starts_with("http://") || arg.starts_with("https://");
        if !is_regex && !is_url {
            return Some("|");
        }

        let after = arg[idx + 1..].trim();
        let piped = PIPE_TARGETS
            .iter()
            .any(|cmd| after == *cmd || after.starts_with(&format!("{cmd} ")));
        if is_regex && piped {
            return Some("|");
        }
    }

    None
}

/// Validation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Executable name is empty.
    EmptyCommand,
    /// Executable is not in the allow-list.
    NotAllowed { command: String },
    /// Argument contains a shell-injection pattern.
    DangerousArgument { arg: String, pattern: &'static str },
    /// Argument exceeds maximum length.
    ArgumentTooLong { length: usize, max: usize },
    /// Too many arguments.
    TooManyArguments { count: usize, max: usize },
    /// Command or argument contains invalid character.
    InvalidCharacter(char),
    /// Path contains traversal attempt.
    PathTraversal,
    /// Path is too long.
    PathTooLong { length: usize, max: usize },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyCommand => write!(f, "Command cannot be empty"),
            Self::NotAllowed { command } => {
                write!(f, "Command is not in allowed list: '{}'", command)
            }
            Self::DangerousArgument { arg, pattern } => {
                write!(
                    f,
                    "Invalid argument '{}': dangerous pattern '{}' detected",
                    arg, pattern
                )
            }
            Self::ArgumentTooLong { length, max } => {
                write!(f, "Argument too long: {} bytes (max: {})", length, max)
            }
            Self::TooManyArguments { count, max } => {
                write!(f, "Too many arguments: {} (max: {})", count, max)
            }
            Self::InvalidCharacter(c) => {
                write!(f, "Command contains invalid character: {:?}", c)
            }
            Self::PathTraversal => write!(f, "Path traversal detected"),
            Self::PathTooLong { length, max } => {
                write!(f, "Path too long: {} chars (max: {})", length, max)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Sanitize a string for logging or display.
pub fn sanitize_for_display(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .take(1000)
        .collect()
}

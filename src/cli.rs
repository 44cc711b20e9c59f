//! Command-line interface for taskexec.
//!
//! Uses lexopt for minimal binary size overhead (~34KB).

use std::ffi::OsString;
use std::path::PathBuf;

use crate::error::ExecError;
use crate::execution::Command;

/// Exit status when the deadline killed the command (as coreutils `timeout`).
pub const EXIT_TIMEOUT: u8 = 124;
/// Exit status when the executable was not found.
pub const EXIT_NOT_FOUND: u8 = 127;
/// Exit status after Ctrl-C.
pub const EXIT_CANCELED: u8 = 130;
/// Exit status for any other failure.
pub const EXIT_FAILURE: u8 = 1;

/// Command-line arguments.
#[derive(Debug, Clone, Default)]
pub struct Args {
    /// Log instead of executing.
    pub dry_run: bool,
    /// Capture stdout and print it verbatim.
    pub output: bool,
    /// Retries on transient failure (overrides config file).
    pub retries: Option<u32>,
    /// Initial retry delay in milliseconds (overrides config file).
    pub delay_ms: Option<u64>,
    /// Working directory.
    pub dir: Option<PathBuf>,
    /// Environment overlay, in order given.
    pub env: Vec<(String, String)>,
    /// Path to configuration file.
    pub config: Option<PathBuf>,
    /// Log level (error, warn, info, debug, trace).
    pub log_level: Option<String>,
    /// Print the timeout tier and exit.
    pub show_timeout: bool,
    /// Show version and exit.
    pub version: bool,
    /// Show help and exit.
    pub help: bool,
    /// Executable to run.
    pub command: Option<String>,
    /// Arguments passed through to the executable.
    pub args: Vec<String>,
}

impl Args {
    /// The command described by the positional arguments.
    pub fn to_command(&self) -> Option<Command> {
        let name = self.command.as_ref()?;
        Some(
            Command::new(name.as_str())
                .args(self.args.iter().cloned())
                .envs(self.env.iter().cloned())
                .capture_output(self.output),
        )
    }
}

/// Parse command-line arguments.
pub fn parse_args() -> Result<Args, ArgsError> {
    parse_args_from(std::env::args_os())
}

/// Parse arguments from an iterator (for testing).
///
/// Options are read up to the first positional argument; that argument is
/// the command and everything after it is passed through untouched.
pub fn parse_args_from<I>(args: I) -> Result<Args, ArgsError>
where
    I: IntoIterator<Item = OsString>,
{
    use lexopt::prelude::*;

    let mut result = Args::default();
    let mut parser = lexopt::Parser::from_iter(args);

    while let Some(arg) = parser.next()? {
        match arg {
            Short('h') | Long("help") => {
                result.help = true;
            }
            Short('V') | Long("version") => {
                result.version = true;
            }
            Short('n') | Long("dry-run") => {
                result.dry_run = true;
            }
            Short('o') | Long("output") => {
                result.output = true;
            }
            Short('r') | Long("retries") => {
                let value: String = parser.value()?.parse()?;
                result.retries = Some(
                    value
                        .parse()
                        .map_err(|_| ArgsError::InvalidValue("retries", value))?,
                );
            }
            Short('d') | Long("delay") => {
                let value: String = parser.value()?.parse()?;
                result.delay_ms = Some(
                    value
                        .parse()
                        .map_err(|_| ArgsError::InvalidValue("delay", value))?,
                );
            }
            Short('C') | Long("dir") => {
                result.dir = Some(parser.value()?.parse()?);
            }
            Short('e') | Long("env") => {
                let value: String = parser.value()?.parse()?;
                match value.split_once('=') {
                    Some((key, val)) if !key.is_empty() => {
                        result.env.push((key.to_string(), val.to_string()));
                    }
                    _ => return Err(ArgsError::InvalidValue("env", value)),
                }
            }
            Short('c') | Long("config") => {
                result.config = Some(parser.value()?.parse()?);
            }
            Short('l') | Long("log-level") => {
                result.log_level = Some(parser.value()?.parse()?);
            }
            Long("show-timeout") => {
                result.show_timeout = true;
            }
            Value(val) => {
                result.command = Some(val.string()?);
                for raw in parser.raw_args()? {
                    let raw = raw.into_string().map_err(lexopt::Error::NonUnicodeValue)?;
                    result.args.push(raw);
                }
            }
            _ => return Err(arg.unexpected().into()),
        }
    }

    if result.command.is_none() && !result.help && !result.version {
        return Err(ArgsError::MissingCommand);
    }

    Ok(result)
}

/// Process exit status for a failed run.
pub fn exit_status(err: &ExecError) -> u8 {
    match err {
        ExecError::Exited {
            code: Some(code), ..
        } => u8::try_from(*code).ok().filter(|c| *c != 0).unwrap_or(EXIT_FAILURE),
        ExecError::TimedOut { .. } => EXIT_TIMEOUT,
        ExecError::Canceled { .. } => EXIT_CANCELED,
        ExecError::NotFound { .. } => EXIT_NOT_FOUND,
        ExecError::RetriesExhausted { last, .. } => exit_status(last),
        _ => EXIT_FAILURE,
    }
}

/// Print help message.
pub fn print_help() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        r#"taskexec {version}
Run build and release commands with validation, timeouts and retries

USAGE:
    taskexec [OPTIONS] [--] <COMMAND> [ARGS...]

OPTIONS:
    -n, --dry-run           Log the command instead of running it
    -o, --output            Capture stdout and print it verbatim
    -r, --retries <N>       Retry transient failures up to N times [default: 3]
    -d, --delay <MS>        Initial retry delay in milliseconds [default: 1000]
    -C, --dir <DIR>         Run in DIR
    -e, --env <KEY=VALUE>   Set an environment variable (repeatable)
    -c, --config <FILE>     Path to configuration file (JSON)
    -l, --log-level <LVL>   Log level (error, warn, info, debug, trace)
        --show-timeout      Print the timeout for COMMAND in seconds and exit
    -h, --help              Print help
    -V, --version           Print version

ENVIRONMENT VARIABLES:
    TASKEXEC_DRY_RUN            Dry-run mode (overrides config)
    TASKEXEC_VERBOSE            Log every command (overrides config)
    TASKEXEC_WORKING_DIR        Default working directory (overrides config)
    TASKEXEC_ALLOWED_COMMANDS   Comma-separated executable allow-list
    TASKEXEC_MAX_RETRIES        Retry budget (overrides config)
    TASKEXEC_LOG_LEVEL          Log level (overrides config)
    RUST_LOG                    Alternative log level setting

EXIT STATUS:
    The command's own status, or 124 on timeout, 127 if the executable
    is missing, 130 when interrupted, 1 for anything else.

EXAMPLES:
    # Run the test suite with the go test timeout tier
    taskexec go test ./...

    # Download modules, retrying flaky network failures
    taskexec -r 5 -d 500 go mod download

    # See what an install would do without doing it
    taskexec --dry-run go install golang.org/x/tools/cmd/goimports@latest
"#
    );
}

/// Print version.
pub fn print_version() {
    println!("taskexec {}", env!("CARGO_PKG_VERSION"));
}

/// Argument parsing errors.
#[derive(Debug)]
pub enum ArgsError {
    /// Lexopt parsing error.
    Lexopt(lexopt::Error),
    /// Invalid argument value.
    InvalidValue(&'static str, String),
    /// No command was given.
    MissingCommand,
}

impl std::fmt::Display for ArgsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lexopt(e) => write!(f, "{}", e),
            Self::InvalidValue(name, value) => {
                write!(f, "invalid value for --{}: '{}'", name, value)
            }
            Self::MissingCommand => write!(f, "no command given"),
        }
    }
}

impl std::error::Error for ArgsError {}

impl From<lexopt::Error> for ArgsError {
    fn from(e: lexopt::Error) -> Self {
        Self::Lexopt(e)
    }
}

//! Secure command executor.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::command::Command;
use super::context::{DoneReason, ExecContext};
use super::result::ExecutionOutcome;
use super::timeout::TimeoutPolicy;
use crate::error::ExecError;
use crate::retry::{self, RetryError, RetryPolicy};
use crate::security::{CommandPolicy, CommandValidator, EnvSanitizer};
use crate::Result;

/// Grace period for draining pipes after the process exits.
const IO_CAPTURE_TIMEOUT: Duration = Duration::from_secs(5);

/// Drain time allowed even when the budget is spent.
const MIN_CAPTURE_GRACE: Duration = Duration::from_millis(50);

/// Upper bound on stderr kept for error messages.
const MAX_STDERR_BYTES: usize = 64 * 1024;

/// Validates, times out, retries and runs external commands.
///
/// The executor holds only immutable configuration, so one instance can be
/// shared across tasks and used concurrently.
pub struct SecureExecutor {
    policy: Arc<dyn CommandPolicy>,
    validator: CommandValidator,
    timeouts: TimeoutPolicy,
    env: EnvSanitizer,
    working_dir: Option<PathBuf>,
    dry_run: bool,
    verbose: bool,
}

impl Default for SecureExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SecureExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureExecutor")
            .field("timeouts", &self.timeouts)
            .field("env", &self.env)
            .field("working_dir", &self.working_dir)
            .field("dry_run", &self.dry_run)
            .field("verbose", &self.verbose)
            .finish_non_exhaustive()
    }
}

impl SecureExecutor {
    /// Create an executor with the default validator and timeout table.
    pub fn new() -> Self {
        Self {
            policy: Arc::new(CommandValidator::default()),
            validator: CommandValidator::default(),
            timeouts: TimeoutPolicy::standard(),
            env: EnvSanitizer::default(),
            working_dir: None,
            dry_run: false,
            verbose: false,
        }
    }

    /// Replace the security policy consulted before every spawn.
    pub fn with_policy(mut self, policy: impl CommandPolicy + 'static) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    /// Replace the timeout table.
    pub fn with_timeouts(mut self, timeouts: TimeoutPolicy) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Replace the environment sanitizer.
    pub fn with_env_sanitizer(mut self, env: EnvSanitizer) -> Self {
        self.env = env;
        self
    }

    /// Default working directory for commands that do not set one.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Log commands instead of running them.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Log every command before it runs.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Whether dry-run mode is enabled.
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// The timeout table in use.
    pub fn timeouts(&self) -> &TimeoutPolicy {
        &self.timeouts
    }

    /// Run a command with stdio inherited.
    pub async fn execute(&self, ctx: &ExecContext, name: &str, args: &[&str]) -> Result<()> {
        self.run(ctx, &Command::new(name).args(args.iter().copied()))
            .await
            .map(drop)
    }

    /// Run a command and return its stdout verbatim.
    pub async fn execute_output(
        &self,
        ctx: &ExecContext,
        name: &str,
        args: &[&str],
    ) -> Result<String> {
        let command = Command::new(name)
            .args(args.iter().copied())
            .capture_output(true);
        self.run(ctx, &command).await.map(|o| o.stdout)
    }

    /// Run a command with `env` overlaid on the inherited environment.
    pub async fn execute_with_env(
        &self,
        ctx: &ExecContext,
        env: &HashMap<String, String>,
        name: &str,
        args: &[&str],
    ) -> Result<()> {
        let command = Command::new(name)
            .args(args.iter().copied())
            .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        self.run(ctx, &command).await.map(drop)
    }

    /// Run a command in `dir` with stdio inherited.
    pub async fn execute_in_dir(
        &self,
        ctx: &ExecContext,
        dir: &Path,
        name: &str,
        args: &[&str],
    ) -> Result<()> {
        let command = Command::new(name)
            .args(args.iter().copied())
            .working_dir(dir);
        self.run(ctx, &command).await.map(drop)
    }

    /// Run a command in `dir` and return its stdout verbatim.
    pub async fn execute_output_in_dir(
        &self,
        ctx: &ExecContext,
        dir: &Path,
        name: &str,
        args: &[&str],
    ) -> Result<String> {
        let command = Command::new(name)
            .args(args.iter().copied())
            .working_dir(dir)
            .capture_output(true);
        self.run(ctx, &command).await.map(|o| o.stdout)
    }

    /// Run a command up to `max_retries + 1` times with doubling delays.
    pub async fn execute_with_retry(
        &self,
        ctx: &ExecContext,
        max_retries: u32,
        initial_delay: Duration,
        name: &str,
        args: &[&str],
    ) -> Result<()> {
        let command = Command::new(name).args(args.iter().copied());
        let policy = RetryPolicy::exponential(max_retries, initial_delay);
        self.run_with_retry(ctx, &policy, &command).await.map(drop)
    }

    /// Retrying variant of [`execute_output`](Self::execute_output).
    pub async fn execute_output_with_retry(
        &self,
        ctx: &ExecContext,
        max_retries: u32,
        initial_delay: Duration,
        name: &str,
        args: &[&str],
    ) -> Result<String> {
        let command = Command::new(name)
            .args(args.iter().copied())
            .capture_output(true);
        let policy = RetryPolicy::exponential(max_retries, initial_delay);
        self.run_with_retry(ctx, &policy, &command)
            .await
            .map(|o| o.stdout)
    }

    /// Run `command` under an arbitrary retry policy.
    pub async fn run_with_retry(
        &self,
        ctx: &ExecContext,
        policy: &RetryPolicy,
        command: &Command,
    ) -> Result<ExecutionOutcome> {
        let result = retry::retry(ctx, policy, move |_| self.run(ctx, command)).await;

        result.map_err(|err| match err {
            RetryError::Aborted { error, .. } => error,
            RetryError::Interrupted { reason, .. } => interrupted(command, reason, None),
            RetryError::Exhausted { attempts, last } => ExecError::RetriesExhausted {
                attempts,
                last: Box::new(last),
            },
        })
    }

    /// Resolve the budget for `command`: its policy tier (or explicit
    /// override) capped by whatever time `ctx` has left.
    pub fn effective_timeout(&self, ctx: &ExecContext, command: &Command) -> Duration {
        let tier = command
            .timeout
            .unwrap_or_else(|| self.timeouts.resolve(&command.name, command.args.as_slice()));

        match ctx.remaining() {
            Some(remaining) => remaining.min(tier),
            None => tier,
        }
    }

    /// Validate and run a single command.
    ///
    /// Succeeds only when the process exits zero, or when dry-run mode is on.
    pub async fn run(&self, ctx: &ExecContext, command: &Command) -> Result<ExecutionOutcome> {
        let shown = command.to_string();

        self.policy
            .check(&command.name, &command.args)
            .map_err(|reason| ExecError::Rejected {
                command: shown.clone(),
                reason,
            })?;

        let working_dir = command.working_dir.as_ref().or(self.working_dir.as_ref());
        if let Some(dir) = working_dir {
            self.validator
                .validate_working_dir(&dir.to_string_lossy())
                .map_err(|reason| ExecError::Rejected {
                    command: shown.clone(),
                    reason,
                })?;
        }

        if self.dry_run {
            info!("[DRY RUN] would execute: {}", shown);
            self.audit(command, working_dir, None, true, Duration::ZERO);
            return Ok(ExecutionOutcome::dry_run());
        }

        if let Some(reason) = ctx.done_reason() {
            return Err(interrupted(command, reason, None));
        }

        if self.verbose {
            info!("➤ {}", shown);
        }

        let budget = self.effective_timeout(ctx, command);
        let start = Instant::now();
        let result = self.spawn_and_wait(ctx, command, working_dir, budget).await;
        let elapsed = start.elapsed();

        match &result {
            Ok(outcome) => self.audit(command, working_dir, outcome.exit_code, true, elapsed),
            Err(err) => self.audit(command, working_dir, err.exit_code(), false, elapsed),
        }

        result.map(|mut outcome| {
            outcome.duration = elapsed;
            outcome
        })
    }

    async fn spawn_and_wait(
        &self,
        ctx: &ExecContext,
        command: &Command,
        working_dir: Option<&PathBuf>,
        budget: Duration,
    ) -> Result<ExecutionOutcome> {
        let mut cmd = tokio::process::Command::new(&command.name);
        cmd.args(&command.args).kill_on_drop(true);

        if let Some(dir) = working_dir {
            cmd.current_dir(dir);
        }

        if !self.env.is_passthrough() {
            cmd.env_clear()
                .envs(self.env.filter(std::env::vars_os(), &command.name));
        }
        cmd.envs(&command.env);

        if command.capture_output {
            cmd.stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped());
        } else {
            cmd.stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit());
        }

        let started = Instant::now();
        let mut child = cmd.spawn().map_err(|e| spawn_error(command, e))?;

        let stdout_reader = child.stdout.take().map(|out| Capture::spawn(out, None));
        let stderr_reader = child
            .stderr
            .take()
            .map(|err| Capture::spawn(err, Some(MAX_STDERR_BYTES)));

        let stopped = tokio::select! {
            status = child.wait() => Ok(status?),
            () = ctx.cancelled() => Err(DoneReason::Canceled),
            () = tokio::time::sleep(budget) => Err(DoneReason::DeadlineExceeded),
        };

        let status = match stopped {
            Ok(status) => status,
            Err(reason) => {
                warn!(
                    "command '{}' {}; killing",
                    command,
                    match reason {
                        DoneReason::Canceled => "was canceled",
                        DoneReason::DeadlineExceeded => "timed out",
                    }
                );
                if let Err(e) = child.kill().await {
                    warn!("failed to kill '{}': {}", command, e);
                }
                for capture in [stdout_reader, stderr_reader].into_iter().flatten() {
                    capture.abort();
                }
                return Err(interrupted(command, reason, Some(budget)));
            }
        };

        // A background grandchild can hold the pipes open long after exit.
        let grace = IO_CAPTURE_TIMEOUT
            .min(budget.saturating_sub(started.elapsed()))
            .max(MIN_CAPTURE_GRACE);
        let drain_until = tokio::time::Instant::now() + grace;
        let (stdout, stderr) = tokio::join!(
            collect(ctx, stdout_reader, drain_until),
            collect(ctx, stderr_reader, drain_until),
        );

        if !status.success() {
            return Err(ExecError::Exited {
                command: command.to_string(),
                code: status.code(),
                stderr: String::from_utf8_lossy(&stderr).into_owned(),
            });
        }

        Ok(ExecutionOutcome::new(
            stdout,
            stderr,
            status.code().unwrap_or(0),
            Duration::ZERO,
        ))
    }

    fn audit(
        &self,
        command: &Command,
        working_dir: Option<&PathBuf>,
        exit_code: Option<i32>,
        success: bool,
        duration: Duration,
    ) {
        debug!(
            target: "taskexec::audit",
            command = %command.name,
            args = ?command.args,
            working_dir = ?working_dir,
            exit_code = ?exit_code,
            success,
            duration_ms = duration.as_millis() as u64,
            dry_run = self.dry_run,
            "command executed"
        );
    }
}

fn spawn_error(command: &Command, err: std::io::Error) -> ExecError {
    if err.kind() == std::io::ErrorKind::NotFound {
        ExecError::NotFound {
            command: command.name.clone(),
        }
    } else {
        ExecError::Spawn {
            command: command.to_string(),
            source: err,
        }
    }
}

fn interrupted(command: &Command, reason: DoneReason, budget: Option<Duration>) -> ExecError {
    match reason {
        DoneReason::Canceled => ExecError::Canceled {
            command: command.to_string(),
        },
        DoneReason::DeadlineExceeded => ExecError::TimedOut {
            command: command.to_string(),
            timeout: budget,
        },
    }
}

/// Output of one child pipe, read by a background task.
///
/// The buffer outlives the task, so whatever was read before the task is
/// stopped is still available.
struct Capture {
    buf: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<()>,
}

impl Capture {
    fn spawn<R>(reader: R, limit: Option<usize>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let task = tokio::spawn(read_into(reader, Arc::clone(&buf), limit));
        Self { buf, task }
    }

    fn abort(self) {
        self.task.abort();
    }

    fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *self.buf.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

async fn read_into<R>(mut reader: R, buf: Arc<Mutex<Vec<u8>>>, limit: Option<usize>)
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; 8192];
    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => return,
            Ok(n) => n,
            Err(e) => {
                debug!("output capture ended early: {}", e);
                return;
            }
        };

        // Past the limit the pipe is still drained so the child never blocks.
        let mut guard = buf.lock().unwrap_or_else(PoisonError::into_inner);
        let keep = match limit {
            Some(limit) => n.min(limit.saturating_sub(guard.len())),
            None => n,
        };
        guard.extend_from_slice(&chunk[..keep]);
    }
}

/// Wait for a pipe to reach EOF, but no later than `until` or cancellation.
/// Returns whatever was read either way.
async fn collect(
    ctx: &ExecContext,
    capture: Option<Capture>,
    until: tokio::time::Instant,
) -> Vec<u8> {
    let Some(mut capture) = capture else {
        return Vec::new();
    };

    let finished = tokio::select! {
        biased;
        joined = &mut capture.task => {
            if let Err(e) = joined {
                warn!("output reader task failed: {}", e);
            }
            true
        }
        () = ctx.cancelled() => false,
        () = tokio::time::sleep_until(until) => false,
    };

    let bytes = capture.take();
    if !finished {
        warn!(
            "output pipe still open after process exit; keeping {} bytes read so far",
            bytes.len()
        );
        capture.abort();
    }
    bytes
}

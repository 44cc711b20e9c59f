//! The two-call process interface consumed by task namespaces.
//!
//! Tasks never spawn processes themselves. They hold an
//! `Arc<dyn CommandRunner>` (usually a [`RunnerHandle`]) and ask it to run
//! a name plus an argument list, receiving an error and optionally stdout.
//! Tests substitute a [`MockRunner`] through the same interface.

mod mock;

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;

use crate::execution::{ExecContext, SecureExecutor};
use crate::Result;

pub use mock::{MockCall, MockFailure, MockRunner};

/// Runs external commands on behalf of tasks.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run with stdio inherited; succeeds on a zero exit.
    async fn run_cmd(&self, name: &str, args: &[&str]) -> Result<()>;

    /// Run and return stdout exactly as the process wrote it.
    async fn run_cmd_output(&self, name: &str, args: &[&str]) -> Result<String>;

    /// Run in `dir` with stdio inherited.
    async fn run_cmd_in_dir(&self, dir: &Path, name: &str, args: &[&str]) -> Result<()>;

    /// Run in `dir` and return stdout.
    async fn run_cmd_output_in_dir(&self, dir: &Path, name: &str, args: &[&str])
        -> Result<String>;

    /// Run with `env` overlaid on the inherited environment.
    async fn run_cmd_with_env(
        &self,
        env: &HashMap<String, String>,
        name: &str,
        args: &[&str],
    ) -> Result<()>;

    /// Run with retries on transient failures.
    ///
    /// Runners without retry support make a single attempt.
    async fn run_cmd_with_retry(
        &self,
        _max_retries: u32,
        _initial_delay: Duration,
        name: &str,
        args: &[&str],
    ) -> Result<()> {
        self.run_cmd(name, args).await
    }
}

/// [`CommandRunner`] backed by a [`SecureExecutor`].
///
/// Every call runs under a child of the runner's root context, so cancelling
/// the root stops whatever is in flight.
#[derive(Debug, Clone, Default)]
pub struct SecureCommandRunner {
    executor: Arc<SecureExecutor>,
    ctx: ExecContext,
}

impl SecureCommandRunner {
    /// Wrap an executor with a fresh root context.
    pub fn new(executor: SecureExecutor) -> Self {
        Self::with_context(executor, ExecContext::new())
    }

    /// Wrap an executor under an existing context.
    pub fn with_context(executor: SecureExecutor, ctx: ExecContext) -> Self {
        Self {
            executor: Arc::new(executor),
            ctx,
        }
    }

    /// The wrapped executor.
    pub fn executor(&self) -> &SecureExecutor {
        &self.executor
    }

    /// The root context calls run under.
    pub fn context(&self) -> &ExecContext {
        &self.ctx
    }
}

#[async_trait]
impl CommandRunner for SecureCommandRunner {
    async fn run_cmd(&self, name: &str, args: &[&str]) -> Result<()> {
        self.executor.execute(&self.ctx.child(None), name, args).await
    }

    async fn run_cmd_output(&self, name: &str, args: &[&str]) -> Result<String> {
        self.executor
            .execute_output(&self.ctx.child(None), name, args)
            .await
    }

    async fn run_cmd_in_dir(&self, dir: &Path, name: &str, args: &[&str]) -> Result<()> {
        self.executor
            .execute_in_dir(&self.ctx.child(None), dir, name, args)
            .await
    }

    async fn run_cmd_output_in_dir(
        &self,
        dir: &Path,
        name: &str,
        args: &[&str],
    ) -> Result<String> {
        self.executor
            .execute_output_in_dir(&self.ctx.child(None), dir, name, args)
            .await
    }

    async fn run_cmd_with_env(
        &self,
        env: &HashMap<String, String>,
        name: &str,
        args: &[&str],
    ) -> Result<()> {
        self.executor
            .execute_with_env(&self.ctx.child(None), env, name, args)
            .await
    }

    async fn run_cmd_with_retry(
        &self,
        max_retries: u32,
        initial_delay: Duration,
        name: &str,
        args: &[&str],
    ) -> Result<()> {
        self.executor
            .execute_with_retry(&self.ctx.child(None), max_retries, initial_delay, name, args)
            .await
    }
}

/// Shared, swappable reference to the active runner.
///
/// Clones share the slot: a [`set`](Self::set) through any clone is seen by
/// every call issued afterwards. The handle is itself a [`CommandRunner`]
/// that looks up the current runner on each call.
#[derive(Clone)]
pub struct RunnerHandle {
    current: Arc<RwLock<Arc<dyn CommandRunner>>>,
}

impl Default for RunnerHandle {
    fn default() -> Self {
        Self::new(Arc::new(SecureCommandRunner::default()))
    }
}

impl std::fmt::Debug for RunnerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunnerHandle").finish_non_exhaustive()
    }
}

impl RunnerHandle {
    /// Create a handle pointing at `runner`.
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            current: Arc::new(RwLock::new(runner)),
        }
    }

    /// The runner currently installed.
    pub fn get(&self) -> Arc<dyn CommandRunner> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Install `runner`, returning the one it replaces.
    pub fn set(&self, runner: Arc<dyn CommandRunner>) -> Arc<dyn CommandRunner> {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *current, runner)
    }

    /// Install `runner` until the returned guard is dropped.
    #[must_use = "the previous runner is restored when the guard is dropped"]
    pub fn scoped(&self, runner: Arc<dyn CommandRunner>) -> RunnerGuard {
        let previous = self.set(runner);
        RunnerGuard {
            handle: self.clone(),
            previous: Some(previous),
        }
    }
}

/// Restores the previous runner on drop. See [`RunnerHandle::scoped`].
pub struct RunnerGuard {
    handle: RunnerHandle,
    previous: Option<Arc<dyn CommandRunner>>,
}

impl Drop for RunnerGuard {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            self.handle.set(previous);
        }
    }
}

#[async_trait]
impl CommandRunner for RunnerHandle {
    async fn run_cmd(&self, name: &str, args: &[&str]) -> Result<()> {
        self.get().run_cmd(name, args).await
    }

    async fn run_cmd_output(&self, name: &str, args: &[&str]) -> Result<String> {
        self.get().run_cmd_output(name, args).await
    }

    async fn run_cmd_in_dir(&self, dir: &Path, name: &str, args: &[&str]) -> Result<()> {
        self.get().run_cmd_in_dir(dir, name, args).await
    }

    async fn run_cmd_output_in_dir(
        &self,
        dir: &Path,
        name: &str,
        args: &[&str],
    ) -> Result<String> {
        self.get().run_cmd_output_in_dir(dir, name, args).await
    }

    async fn run_cmd_with_env(
        &self,
        env: &HashMap<String, String>,
        name: &str,
        args: &[&str],
    ) -> Result<()> {
        self.get().run_cmd_with_env(env, name, args).await
    }

    async fn run_cmd_with_retry(
        &self,
        max_retries: u32,
        initial_delay: Duration,
        name: &str,
        args: &[&str],
    ) -> Result<()> {
        self.get()
            .run_cmd_with_retry(max_retries, initial_delay, name, args)
            .await
    }
}

//! Scripted runner for tests.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::CommandRunner;
use crate::error::ExecError;
use crate::Result;

/// One recorded invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub name: String,
    pub args: Vec<String>,
    pub dir: Option<PathBuf>,
    pub env: HashMap<String, String>,
}

impl MockCall {
    /// The `"name arg1 arg2"` key responses are looked up by.
    pub fn key(&self) -> String {
        std::iter::once(self.name.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A failure the mock should report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// Executable missing.
    NotFound,
    /// Process exited with this status.
    Exit(i32),
    /// Deadline elapsed.
    TimedOut,
    /// Caller canceled.
    Canceled,
}

impl MockFailure {
    fn to_error(self, command: String) -> ExecError {
        match self {
            Self::NotFound => ExecError::NotFound { command },
            Self::Exit(code) => ExecError::Exited {
                command,
                code: Some(code),
                stderr: String::new(),
            },
            Self::TimedOut => ExecError::TimedOut {
                command,
                timeout: None,
            },
            Self::Canceled => ExecError::Canceled { command },
        }
    }
}

type Response = std::result::Result<String, MockFailure>;

/// [`CommandRunner`] that records calls instead of spawning processes.
///
/// Unscripted commands succeed with empty output. A scripted command replays
/// its responses in order and keeps repeating the last one.
#[derive(Debug, Default)]
pub struct MockRunner {
    calls: Mutex<Vec<MockCall>>,
    responses: Mutex<HashMap<String, VecDeque<Response>>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Respond to `key` with `stdout`.
    pub fn with_output(self, key: &str, stdout: &str) -> Self {
        self.with_response(key, Ok(stdout.to_string()))
    }

    /// Respond to `key` with `failure`.
    pub fn with_failure(self, key: &str, failure: MockFailure) -> Self {
        self.with_response(key, Err(failure))
    }

    fn with_response(mut self, key: &str, response: Response) -> Self {
        self.responses
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.to_string())
            .or_default()
            .push_back(response);
        self
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Keys of every call made so far.
    pub fn commands(&self) -> Vec<String> {
        self.calls().iter().map(MockCall::key).collect()
    }

    fn record(
        &self,
        name: &str,
        args: &[&str],
        dir: Option<&Path>,
        env: Option<&HashMap<String, String>>,
    ) -> Result<String> {
        let call = MockCall {
            name: name.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            dir: dir.map(Path::to_path_buf),
            env: env.cloned().unwrap_or_default(),
        };
        let key = call.key();

        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);

        let mut responses = self.responses.lock().unwrap_or_else(PoisonError::into_inner);
        let response = match responses.get_mut(&key) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };

        match response {
            Some(Ok(stdout)) => Ok(stdout),
            Some(Err(failure)) => Err(failure.to_error(key)),
            None => Ok(String::new()),
        }
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn run_cmd(&self, name: &str, args: &[&str]) -> Result<()> {
        self.record(name, args, None, None).map(drop)
    }

    async fn run_cmd_output(&self, name: &str, args: &[&str]) -> Result<String> {
        self.record(name, args, None, None)
    }

    async fn run_cmd_in_dir(&self, dir: &Path, name: &str, args: &[&str]) -> Result<()> {
        self.record(name, args, Some(dir), None).map(drop)
    }

    async fn run_cmd_output_in_dir(
        &self,
        dir: &Path,
        name: &str,
        args: &[&str],
    ) -> Result<String> {
        self.record(name, args, Some(dir), None)
    }

    async fn run_cmd_with_env(
        &self,
        env: &HashMap<String, String>,
        name: &str,
        args: &[&str],
    ) -> Result<()> {
        self.record(name, args, None, Some(env)).map(drop)
    }

    async fn run_cmd_with_retry(
        &self,
        max_retries: u32,
        _initial_delay: Duration,
        name: &str,
        args: &[&str],
    ) -> Result<()> {
        let mut last = None;
        for _ in 0..=max_retries {
            match self.record(name, args, None, None) {
                Ok(_) => return Ok(()),
                Err(err) if err.is_transient() => last = Some(err),
                Err(err) => return Err(err),
            }
        }

        match last {
            Some(last) => Err(ExecError::RetriesExhausted {
                attempts: max_retries.saturating_add(1),
                last: Box::new(last),
            }),
            None => Ok(()),
        }
    }
}

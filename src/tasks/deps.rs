//! Go module dependency tasks.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use super::TaskError;
use crate::runner::CommandRunner;

/// `go mod` maintenance.
#[derive(Clone)]
pub struct Deps {
    runner: Arc<dyn CommandRunner>,
    max_retries: u32,
    initial_delay: Duration,
}

impl Deps {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
        }
    }

    /// Retry budget for network-bound steps.
    pub fn with_retry(mut self, max_retries: u32, initial_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.initial_delay = initial_delay;
        self
    }

    /// `go mod tidy`
    pub async fn tidy(&self) -> Result<(), TaskError> {
        info!("tidying go.mod");
        self.runner
            .run_cmd("go", &["mod", "tidy"])
            .await
            .map_err(TaskError::wrap("tidy dependencies"))
    }

    /// `go mod download`, retried because it talks to the module proxy.
    pub async fn download(&self) -> Result<(), TaskError> {
        info!("downloading modules");
        self.runner
            .run_cmd_with_retry(self.max_retries, self.initial_delay, "go", &["mod", "download"])
            .await
            .map_err(TaskError::wrap("download dependencies"))
    }

    /// `go mod verify`, returning what it printed.
    pub async fn verify(&self) -> Result<String, TaskError> {
        self.runner
            .run_cmd_output("go", &["mod", "verify"])
            .await
            .map_err(TaskError::wrap("verify dependencies"))
    }
}

//! Parallel `go vet`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinSet;
use tracing::{debug, info};

use super::TaskError;
use crate::error::ExecError;
use crate::runner::CommandRunner;

/// A package that failed to vet.
#[derive(Debug)]
pub struct VetFailure {
    pub package: String,
    pub error: ExecError,
}

pub(super) fn package_list(failures: &[VetFailure]) -> String {
    failures
        .iter()
        .map(|f| f.package.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Runs `go vet` over packages on a fixed-size worker pool.
#[derive(Clone)]
pub struct Vet {
    runner: Arc<dyn CommandRunner>,
    workers: usize,
}

impl Vet {
    /// One worker per available CPU.
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            workers: num_cpus::get(),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Number of concurrent `go vet` processes.
    pub fn workers(&self) -> usize {
        self.workers.max(1)
    }

    /// Vet every package, reporting all failures rather than the first.
    pub async fn run(&self, packages: &[&str]) -> Result<(), TaskError> {
        let queue: VecDeque<(usize, String)> = packages
            .iter()
            .enumerate()
            .map(|(i, p)| (i, p.to_string()))
            .collect();
        let queue = Arc::new(Mutex::new(queue));
        let workers = self.workers().min(packages.len());

        info!("vetting {} packages with {} workers", packages.len(), workers);

        let mut pool = JoinSet::new();
        for _ in 0..workers {
            let queue = Arc::clone(&queue);
            let runner = Arc::clone(&self.runner);
            pool.spawn(async move {
                let mut failed = Vec::new();
                loop {
                    let next = queue.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
                    let Some((index, package)) = next else {
                        break;
                    };

                    debug!("go vet {}", package);
                    let result = runner.run_cmd("go", &["vet", package.as_str()]).await;
                    if let Err(error) = result {
                        failed.push((index, VetFailure { package, error }));
                    }
                }
                failed
            });
        }

        let mut failures = Vec::new();
        while let Some(joined) = pool.join_next().await {
            match joined {
                Ok(failed) => failures.extend(failed),
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(e) => debug!("vet worker stopped: {}", e),
            }
        }

        if failures.is_empty() {
            return Ok(());
        }

        failures.sort_by_key(|(index, _)| *index);
        Err(TaskError::Vet {
            failures: failures.into_iter().map(|(_, f)| f).collect(),
        })
    }
}

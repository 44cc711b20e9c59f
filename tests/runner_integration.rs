//! Runner integration tests.
//!
//! These tests verify runner substitution and the task namespaces that
//! consume runners.

use std::sync::Arc;
use std::time::Duration;

use taskexec::runner::{MockFailure, MockRunner};
use taskexec::{
    CommandRunner, Deps, FailureClass, RunnerHandle, SecureCommandRunner, SecureExecutor,
    TaskError, Vet,
};

// ============================================================================
// Handle Tests
// ============================================================================

#[tokio::test]
async fn test_tasks_see_runner_swaps() {
    let handle = RunnerHandle::new(Arc::new(MockRunner::new()));
    let deps = Deps::new(Arc::new(handle.clone()));

    let first = Arc::new(MockRunner::new());
    handle.set(first.clone());
    deps.tidy().await.unwrap();

    let second = Arc::new(MockRunner::new());
    handle.set(second.clone());
    deps.tidy().await.unwrap();

    assert_eq!(first.commands(), vec!["go mod tidy"]);
    assert_eq!(second.commands(), vec!["go mod tidy"]);
}

#[tokio::test]
async fn test_set_returns_previous_runner() {
    let original: Arc<dyn CommandRunner> = Arc::new(MockRunner::new());
    let handle = RunnerHandle::new(original.clone());

    let previous = handle.set(Arc::new(MockRunner::new()));
    assert!(Arc::ptr_eq(&previous, &original));
}

#[tokio::test]
async fn test_scoped_runner_for_one_test() {
    let handle = RunnerHandle::new(Arc::new(SecureCommandRunner::new(
        SecureExecutor::new().with_dry_run(true),
    )));
    let mock = Arc::new(MockRunner::new().with_output("go mod verify", "all modules verified\n"));

    {
        let _guard = handle.scoped(mock.clone());
        let out = Deps::new(Arc::new(handle.clone())).verify().await.unwrap();
        assert_eq!(out, "all modules verified\n");
    }

    // Back on the dry-run runner
    let out = handle.run_cmd_output("go", &["mod", "verify"]).await.unwrap();
    assert_eq!(out, "");
    assert_eq!(mock.calls().len(), 1);
}

// ============================================================================
// Task Tests
// ============================================================================

#[tokio::test]
async fn test_deps_errors_keep_classification() {
    let mock = Arc::new(
        MockRunner::new()
            .with_failure("go mod tidy", MockFailure::NotFound)
            .with_failure("go mod download", MockFailure::TimedOut),
    );
    let deps = Deps::new(mock.clone()).with_retry(3, Duration::ZERO);

    let tidy = deps.tidy().await.unwrap_err();
    assert!(tidy.to_string().starts_with("failed to tidy dependencies"));
    assert_eq!(tidy.class(), FailureClass::Permanent);

    let download = deps.download().await.unwrap_err();
    assert_eq!(download.class(), FailureClass::Canceled);
    // Cancellation is never retried
    assert_eq!(mock.commands(), vec!["go mod tidy", "go mod download"]);
}

#[tokio::test]
async fn test_vet_reports_every_failing_package() {
    let mock = Arc::new(
        MockRunner::new()
            .with_failure("go vet ./internal/a", MockFailure::Exit(1))
            .with_failure("go vet ./internal/c", MockFailure::Exit(1)),
    );
    let packages = ["./internal/a", "./internal/b", "./internal/c"];

    let err = Vet::new(mock.clone())
        .with_workers(2)
        .run(&packages)
        .await
        .unwrap_err();

    match err {
        TaskError::Vet { ref failures } => {
            assert_eq!(failures.len(), 2);
            assert_eq!(failures[0].package, "./internal/a");
            assert_eq!(failures[1].package, "./internal/c");
        }
        ref other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.class(), FailureClass::Transient);
    assert_eq!(mock.calls().len(), 3);
}

#[cfg(unix)]
#[tokio::test]
async fn test_secure_runner_runs_real_processes() {
    let runner = SecureCommandRunner::new(SecureExecutor::new());

    runner.run_cmd("true", &[]).await.unwrap();
    let out = runner.run_cmd_output("echo", &["hello", "world"]).await.unwrap();
    assert_eq!(out, "hello world\n");

    let err = runner
        .run_cmd_with_retry(2, Duration::from_millis(1), "nonexistentcommandxyz123", &[])
        .await
        .unwrap_err();
    assert!(err.is_permanent());
}

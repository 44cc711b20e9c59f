//! Executor integration tests.
//!
//! These tests spawn real processes and rely on a POSIX userland
//! (`echo`, `sh`, `sleep`, `printf`, `pwd`).

#![cfg(unix)]

use std::path::Path;
use std::time::{Duration, Instant};

use taskexec::security::AllowAll;
use taskexec::{Command, ExecContext, ExecError, FailureClass, SecureExecutor};

fn executor() -> SecureExecutor {
    SecureExecutor::new()
}

/// Executor that lets `sh -c` scripts through validation.
fn shell_executor() -> SecureExecutor {
    SecureExecutor::new().with_policy(AllowAll)
}

fn line_count(path: &Path) -> usize {
    std::fs::read_to_string(path)
        .map(|s| s.lines().count())
        .unwrap_or(0)
}

// ============================================================================
// Basic Execution Tests
// ============================================================================

#[tokio::test]
async fn test_echo_succeeds() {
    let ctx = ExecContext::new();

    executor()
        .execute(&ctx, "echo", &["hello", "world"])
        .await
        .unwrap();

    let out = executor()
        .execute_output(&ctx, "echo", &["hello", "world"])
        .await
        .unwrap();
    assert_eq!(out, "hello world\n");
}

#[tokio::test]
async fn test_output_keeps_trailing_whitespace() {
    let out = executor()
        .execute_output(&ExecContext::new(), "printf", &["a  \\n\\n"])
        .await
        .unwrap();
    assert_eq!(out, "a  \n\n");
}

#[tokio::test]
async fn test_outcome_carries_raw_bytes_and_exit_code() {
    let command = Command::new("printf").arg("raw").capture_output(true);
    let outcome = executor().run(&ExecContext::new(), &command).await.unwrap();

    assert_eq!(outcome.raw_stdout, b"raw");
    assert_eq!(outcome.exit_code, Some(0));
    assert!(!outcome.dry_run);
}

#[tokio::test]
async fn test_nonzero_exit_is_transient() {
    let err = shell_executor()
        .execute(&ExecContext::new(), "sh", &["-c", "exit 3"])
        .await
        .unwrap_err();

    assert_eq!(err.class(), FailureClass::Transient);
    assert_eq!(err.exit_code(), Some(3));
}

#[tokio::test]
async fn test_stderr_attached_to_exit_error() {
    let command = Command::new("sh")
        .args(["-c", "echo broken >&2; exit 1"])
        .capture_output(true);
    let err = shell_executor()
        .run(&ExecContext::new(), &command)
        .await
        .unwrap_err();

    match err {
        ExecError::Exited { stderr, .. } => assert_eq!(stderr, "broken\n"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_output_in_dir() {
    let dir = tempfile::tempdir().unwrap();
    let out = executor()
        .execute_output_in_dir(&ExecContext::new(), dir.path(), "pwd", &[])
        .await
        .unwrap();

    assert_eq!(
        Path::new(out.trim_end()).canonicalize().unwrap(),
        dir.path().canonicalize().unwrap()
    );
}

#[tokio::test]
async fn test_executor_default_working_dir() {
    let dir = tempfile::tempdir().unwrap();
    let out = executor()
        .with_working_dir(dir.path())
        .execute_output(&ExecContext::new(), "pwd", &[])
        .await
        .unwrap();

    assert_eq!(
        Path::new(out.trim_end()).canonicalize().unwrap(),
        dir.path().canonicalize().unwrap()
    );
}

// ============================================================================
// Environment Tests
// ============================================================================

#[tokio::test]
async fn test_sensitive_env_is_withheld_but_overlay_passes() {
    std::env::set_var("SECRET_TASKEXEC_INTEGRATION", "hunter2");

    let inherited = Command::new("sh")
        .args(["-c", "printf %s \"${SECRET_TASKEXEC_INTEGRATION:-unset}\""])
        .capture_output(true);
    let outcome = shell_executor()
        .run(&ExecContext::new(), &inherited)
        .await
        .unwrap();
    assert_eq!(outcome.stdout, "unset");

    let overlaid = inherited.env("SECRET_TASKEXEC_INTEGRATION", "given");
    let outcome = shell_executor()
        .run(&ExecContext::new(), &overlaid)
        .await
        .unwrap();
    assert_eq!(outcome.stdout, "given");
}

#[tokio::test]
async fn test_ordinary_env_is_inherited() {
    std::env::set_var("TASKEXEC_INTEGRATION_PLAIN", "visible");

    let command = Command::new("sh")
        .args(["-c", "printf %s \"$TASKEXEC_INTEGRATION_PLAIN\""])
        .capture_output(true);
    let outcome = shell_executor()
        .run(&ExecContext::new(), &command)
        .await
        .unwrap();
    assert_eq!(outcome.stdout, "visible");
}

#[tokio::test]
async fn test_non_unicode_inherited_env_is_tolerated() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    std::env::set_var("TASKEXEC_INTEGRATION_BYTES", OsStr::from_bytes(b"\xff\xfe"));

    let result = executor()
        .execute_output(&ExecContext::new(), "echo", &["hi"])
        .await;

    std::env::remove_var("TASKEXEC_INTEGRATION_BYTES");
    assert_eq!(result.unwrap(), "hi\n");
}

// ============================================================================
// Retry Tests
// ============================================================================

#[tokio::test]
async fn test_missing_executable_single_attempt() {
    let start = Instant::now();
    let err = executor()
        .execute_with_retry(
            &ExecContext::new(),
            2,
            Duration::from_millis(500),
            "nonexistentcommandxyz123",
            &[],
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ExecError::NotFound { .. }));
    assert!(err.is_permanent());
    // No backoff sleep happened
    assert!(start.elapsed() < Duration::from_millis(500));
}

#[tokio::test]
async fn test_transient_failure_uses_whole_budget() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("attempts");
    let script = format!("echo x >> '{}'; exit 1", log.display());

    let err = shell_executor()
        .execute_with_retry(
            &ExecContext::new(),
            2,
            Duration::from_millis(5),
            "sh",
            &["-c", &script],
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ExecError::RetriesExhausted { attempts: 3, .. }));
    assert!(err.to_string().contains("after 3 attempts"));
    assert_eq!(line_count(&log), 3);
}

#[tokio::test]
async fn test_retry_stops_once_command_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("attempts");
    // Fails until the log has two lines.
    let script = format!(
        "echo x >> '{0}'; [ $(wc -l < '{0}') -ge 2 ]",
        log.display()
    );

    shell_executor()
        .execute_with_retry(
            &ExecContext::new(),
            5,
            Duration::from_millis(5),
            "sh",
            &["-c", &script],
        )
        .await
        .unwrap();

    assert_eq!(line_count(&log), 2);
}

#[tokio::test]
async fn test_exit_127_is_not_retried() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("attempts");
    let script = format!("echo x >> '{}'; exit 127", log.display());

    let err = shell_executor()
        .execute_with_retry(
            &ExecContext::new(),
            3,
            Duration::from_millis(5),
            "sh",
            &["-c", &script],
        )
        .await
        .unwrap_err();

    assert!(err.is_permanent());
    assert_eq!(line_count(&log), 1);
}

#[tokio::test]
async fn test_output_with_retry_returns_stdout() {
    let out = executor()
        .execute_output_with_retry(
            &ExecContext::new(),
            2,
            Duration::from_millis(5),
            "echo",
            &["retried"],
        )
        .await
        .unwrap();
    assert_eq!(out, "retried\n");
}

// ============================================================================
// Deadline And Cancellation Tests
// ============================================================================

#[tokio::test]
async fn test_context_deadline_kills_process() {
    let ctx = ExecContext::with_timeout(Duration::from_millis(5));
    let start = Instant::now();

    let err = executor()
        .execute_with_retry(&ctx, 5, Duration::from_millis(100), "sleep", &["10"])
        .await
        .unwrap_err();

    assert!(err.is_timeout(), "unexpected error: {err}");
    assert_eq!(err.class(), FailureClass::Canceled);
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_command_timeout_override_kills_process() {
    let command = Command::new("sleep")
        .arg("10")
        .timeout(Duration::from_millis(50));
    let start = Instant::now();

    let err = executor()
        .run(&ExecContext::new(), &command)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ExecError::TimedOut {
            timeout: Some(t),
            ..
        } if t == Duration::from_millis(50)
    ));
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_cancel_kills_process() {
    let ctx = ExecContext::new();
    let canceler = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceler.cancel();
    });

    let start = Instant::now();
    let err = executor()
        .execute(&ctx, "sleep", &["10"])
        .await
        .unwrap_err();

    assert!(matches!(err, ExecError::Canceled { .. }));
    assert!(!err.is_timeout());
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_output_kept_when_grandchild_holds_pipe() {
    let ctx = ExecContext::with_timeout(Duration::from_secs(1));
    let start = Instant::now();

    let out = shell_executor()
        .execute_output(&ctx, "sh", &["-c", "echo hi; sleep 8 &"])
        .await
        .unwrap();

    assert_eq!(out, "hi\n");
    assert!(start.elapsed() < Duration::from_secs(4));
}

// ============================================================================
// Dry Run Tests
// ============================================================================

#[tokio::test]
async fn test_dry_run_leaves_filesystem_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("keep");
    std::fs::write(&target, "data").unwrap();
    let target_str = target.to_str().unwrap();

    let dry = executor().with_dry_run(true);
    let ctx = ExecContext::new();

    dry.execute(&ctx, "rm", &["-f", target_str]).await.unwrap();
    assert_eq!(dry.execute_output(&ctx, "cat", &[target_str]).await.unwrap(), "");
    dry.execute_with_retry(&ctx, 3, Duration::from_secs(1), "rm", &["-rf", "/"])
        .await
        .unwrap();

    assert!(target.exists());
}

use std::sync::Arc;
use std::time::{Duration, Instant};

use parallel::error::ExecError;
use parallel::exec::runner::{CommandRunner, ProcessRunner};
use parallel::exec::signal::ShutdownSignal;
use parallel::logging::ChainColor;
use parallel::orchestration::registry::ProcessRegistry;
use parallel::orchestration::types::{Command, CommandChain};
use tokio_util::sync::CancellationToken;

fn setup() -> (Arc<ProcessRegistry>, ProcessRunner) {
    let registry = Arc::new(ProcessRegistry::with_kill_timeout(Duration::from_millis(500)));
    let runner = ProcessRunner::new(Arc::clone(&registry), Arc::new(ShutdownSignal::new()));
    (registry, runner)
}

fn chain() -> CommandChain {
    CommandChain::new("test", ChainColor::PLAIN)
}

fn sh(script: &str) -> Command {
    Command::new("sh").args(["-c", script])
}

/// Running means present in `/proc` and not a zombie awaiting its reaper.
fn is_running(pid: i32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => !stat
            .rsplit_once(") ")
            .is_some_and(|(_, rest)| rest.starts_with('Z')),
        Err(_) => false,
    }
}

fn read_pid(path: &std::path::Path) -> i32 {
    std::fs::read_to_string(path)
        .expect("pid file was not written")
        .trim()
        .parse()
        .expect("pid file holds a pid")
}

// ============================================================
// Buffered mode
// ============================================================

#[tokio::test]
async fn test_execute_success() {
    let (registry, runner) = setup();
    let result = runner
        .execute(&CancellationToken::new(), &chain(), &Command::new("echo").args(["hello"]))
        .await;
    assert!(result.is_ok());
    assert!(registry.is_empty(), "registry must be empty after completion");
}

#[tokio::test]
async fn test_execute_nonzero_exit() {
    let (registry, runner) = setup();
    let err = runner
        .execute(&CancellationToken::new(), &chain(), &sh("echo oops >&2; exit 42"))
        .await
        .unwrap_err();
    assert!(matches!(err, ExecError::ExitStatus(42)));
    assert!(err.to_string().starts_with("command execution failed"));
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_execute_missing_executable() {
    let (registry, runner) = setup();
    let err = runner
        .execute(
            &CancellationToken::new(),
            &chain(),
            &Command::new("definitely-not-a-real-binary-1b2c3d"),
        )
        .await
        .unwrap_err();
    match err {
        ExecError::SpawnFailed { program, source } => {
            assert_eq!(program, "definitely-not-a-real-binary-1b2c3d");
            assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
        }
        other => panic!("expected SpawnFailed, got {other:?}"),
    }
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_execute_working_directory() {
    let ws = tempfile::tempdir().expect("failed to create temp dir");
    let (_registry, runner) = setup();

    runner
        .execute(&CancellationToken::new(), &chain(), &sh("pwd > where.txt").dir(ws.path()))
        .await
        .unwrap();

    let written = std::fs::read_to_string(ws.path().join("where.txt")).unwrap();
    let canonical = std::fs::canonicalize(ws.path()).unwrap();
    assert_eq!(written.trim(), canonical.to_str().unwrap());
}

#[tokio::test]
async fn test_execute_pre_cancelled_returns_cancelled() {
    let (registry, runner) = setup();
    let token = CancellationToken::new();
    token.cancel();

    let result = runner
        .execute(&token, &chain(), &Command::new("sleep").args(["30"]))
        .await;
    assert!(matches!(result, Err(ExecError::Cancelled)));
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_execute_cancel_stops_process() {
    let (registry, runner) = setup();
    let token = CancellationToken::new();

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        canceller.cancel();
    });

    let start = Instant::now();
    let result = runner
        .execute(&token, &chain(), &Command::new("sleep").args(["30"]))
        .await;

    assert!(matches!(result, Err(ExecError::Cancelled)));
    assert!(start.elapsed() < Duration::from_secs(5), "took {:?}", start.elapsed());
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_execute_cancel_stops_background_child() {
    let ws = tempfile::tempdir().expect("failed to create temp dir");
    let (registry, runner) = setup();
    let token = CancellationToken::new();

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(400)).await;
        canceller.cancel();
    });

    // The shell exits at once; the background sleep keeps the output open.
    let result = runner
        .execute(&token, &chain(), &sh("sleep 30 & echo $! > child.pid").dir(ws.path()))
        .await;

    assert!(matches!(result, Err(ExecError::Cancelled)));
    let child = read_pid(&ws.path().join("child.pid"));
    assert!(!is_running(child), "background child {child} survived cancellation");
    assert!(registry.is_empty());
}

// ============================================================
// Streaming mode
// ============================================================

#[tokio::test]
async fn test_pipe_success_with_both_streams() {
    let (registry, runner) = setup();
    let result = runner
        .execute_with_pipe(
            &CancellationToken::new(),
            &chain(),
            &sh("echo out1; echo err1 >&2; echo out2"),
        )
        .await;
    assert!(result.is_ok());
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_pipe_nonzero_exit() {
    let (_registry, runner) = setup();
    let err = runner
        .execute_with_pipe(&CancellationToken::new(), &chain(), &sh("echo partial; exit 3"))
        .await
        .unwrap_err();
    assert!(matches!(err, ExecError::ExitStatus(3)));
}

#[tokio::test]
async fn test_pipe_cancel_stops_process() {
    let (registry, runner) = setup();
    let token = CancellationToken::new();

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        canceller.cancel();
    });

    let start = Instant::now();
    let result = runner
        .execute_with_pipe(&token, &chain(), &sh("while true; do echo tick; sleep 0.05; done"))
        .await;

    assert!(matches!(result, Err(ExecError::Cancelled)));
    assert!(start.elapsed() < Duration::from_secs(5));
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_pipe_detached_descendant_does_not_hang() {
    let ws = tempfile::tempdir().expect("failed to create temp dir");
    let (registry, runner) = setup();
    let start = Instant::now();

    // The background sleep keeps stdout open after the shell exits.
    let result = runner
        .execute_with_pipe(
            &CancellationToken::new(),
            &chain(),
            &sh("sleep 30 & echo $! > child.pid; echo started").dir(ws.path()),
        )
        .await;

    assert!(result.is_ok());
    assert!(start.elapsed() < Duration::from_secs(4), "took {:?}", start.elapsed());

    let child = read_pid(&ws.path().join("child.pid"));
    assert!(!is_running(child), "background child {child} outlived the command");
    assert!(registry.is_empty());
}

use std::sync::Arc;
use std::time::{Duration, Instant};

use nix::sys::signal::Signal;
use parallel::error::ExecError;
use parallel::logging::ChainColor;
use parallel::orchestration::manager::Manager;
use parallel::orchestration::types::{Command, CommandChain};
use tokio_util::sync::CancellationToken;

fn chain(name: &str, commands: Vec<Command>) -> CommandChain {
    let mut chain = CommandChain::new(name, ChainColor::PLAIN);
    for command in commands {
        chain.add(command);
    }
    chain
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

// ============================================================
// Parallel execution
// ============================================================

#[tokio::test]
async fn test_build_and_test_chains_complete() {
    let ws = tempfile::tempdir().expect("failed to create temp dir");
    let manager = Manager::new();

    let chains = vec![
        chain("build", vec![sh("echo built > build.log").named("compile").dir(ws.path())]),
        chain(
            "test",
            vec![
                sh("echo linted > lint.log").named("lint").dir(ws.path()).piped(),
                sh("echo reported > report.log").named("report").dir(ws.path()),
            ],
        ),
    ];

    manager
        .execute_parallel(&CancellationToken::new(), chains)
        .await
        .unwrap();

    for file in ["build.log", "lint.log", "report.log"] {
        assert!(ws.path().join(file).exists(), "{file} was not written");
    }
    assert!(manager.registry().is_empty());
}

#[tokio::test]
async fn test_commands_in_chain_run_in_order() {
    let ws = tempfile::tempdir().expect("failed to create temp dir");
    let manager = Manager::new();

    let chains = vec![chain(
        "seq",
        vec![
            sh("echo one >> order.log").dir(ws.path()),
            sh("echo two >> order.log").dir(ws.path()),
            sh("echo three >> order.log").dir(ws.path()),
        ],
    )];

    manager
        .execute_parallel(&CancellationToken::new(), chains)
        .await
        .unwrap();

    let order = std::fs::read_to_string(ws.path().join("order.log")).unwrap();
    assert_eq!(order, "one\ntwo\nthree\n");
}

#[tokio::test]
async fn test_failure_in_one_chain_is_reported() {
    let ws = tempfile::tempdir().expect("failed to create temp dir");
    let manager = Manager::new();

    let chains = vec![
        chain("bad", vec![sh("exit 5"), sh("touch never.log").dir(ws.path())]),
        chain("good", vec![sh("touch good.log").dir(ws.path())]),
    ];

    let err = manager
        .execute_parallel(&CancellationToken::new(), chains)
        .await
        .unwrap_err();

    assert!(matches!(err, ExecError::ExitStatus(5)));
    assert!(!ws.path().join("never.log").exists());
    assert!(ws.path().join("good.log").exists());
}

#[tokio::test]
async fn test_missing_executable_aborts_chain() {
    let ws = tempfile::tempdir().expect("failed to create temp dir");
    let manager = Manager::new();

    let chains = vec![chain(
        "broken",
        vec![
            Command::new("no-such-program-9f8e7d"),
            sh("touch after.log").dir(ws.path()),
        ],
    )];

    let err = manager
        .execute_parallel(&CancellationToken::new(), chains)
        .await
        .unwrap_err();

    match err {
        ExecError::SpawnFailed { source, .. } => {
            assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
        }
        other => panic!("expected SpawnFailed, got {other:?}"),
    }
    assert!(!ws.path().join("after.log").exists());
}

// ============================================================
// Shutdown
// ============================================================

#[tokio::test]
async fn test_cancel_stops_long_running_flow() {
    let manager = Arc::new(Manager::with_kill_timeout(Duration::from_secs(1)));
    let token = CancellationToken::new();

    let chains = vec![
        chain("server", vec![Command::new("sleep").args(["30"]).piped()]),
        chain("worker", vec![Command::new("sleep").args(["30"])]),
    ];

    let run = tokio::spawn({
        let manager = Arc::clone(&manager);
        let token = token.clone();
        async move { manager.execute_parallel(&token, chains).await }
    });

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(manager.registry().len(), 2);

    let start = Instant::now();
    token.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("flow did not stop in time")
        .unwrap();

    assert!(matches!(result, Err(ExecError::Cancelled)));
    assert!(start.elapsed() < Duration::from_secs(3));
    assert!(manager.registry().is_empty());
}

#[tokio::test]
async fn test_stop_all_force_kills_ignoring_group() {
    let kill_timeout = Duration::from_millis(500);
    let manager = Arc::new(Manager::with_kill_timeout(kill_timeout));
    let token = CancellationToken::new();

    let chains = vec![chain("stubborn", vec![sh("trap '' TERM; sleep 30").piped()])];

    let run = tokio::spawn({
        let manager = Arc::clone(&manager);
        let token = token.clone();
        async move { manager.execute_parallel(&token, chains).await }
    });

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(manager.registry().len(), 1);

    let start = Instant::now();
    manager.stop_all_commands().await;
    let elapsed = start.elapsed();

    assert!(elapsed >= kill_timeout, "killed too early: {elapsed:?}");
    assert!(elapsed < kill_timeout + Duration::from_secs(2), "took {elapsed:?}");

    // The killed command surfaces as a signal exit, not a cancellation.
    let result = run.await.unwrap();
    assert!(matches!(result, Err(ExecError::Signaled(9))));
}

#[tokio::test]
async fn test_shutdown_signal_is_used_for_stop_all() {
    let manager = Arc::new(Manager::with_kill_timeout(Duration::from_secs(2)));
    manager.set_shutdown_signal(Signal::SIGINT);
    let token = CancellationToken::new();

    // Exits cleanly on SIGINT only; SIGTERM is ignored.
    let chains = vec![chain(
        "interruptible",
        vec![sh("trap '' TERM; trap 'exit 0' INT; while true; do sleep 0.05; done").piped()],
    )];

    let run = tokio::spawn({
        let manager = Arc::clone(&manager);
        let token = token.clone();
        async move { manager.execute_parallel(&token, chains).await }
    });

    tokio::time::sleep(Duration::from_millis(200)).await;

    let start = Instant::now();
    manager.stop_all_commands().await;
    assert!(start.elapsed() < Duration::from_millis(1500), "SIGINT was not delivered");

    assert!(run.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_stop_all_reaches_whole_process_group() {
    let ws = tempfile::tempdir().expect("failed to create temp dir");
    let manager = Arc::new(Manager::with_kill_timeout(Duration::from_secs(1)));
    let token = CancellationToken::new();

    let chains = vec![
        chain("spawner", vec![sh("sleep 30 & echo $! > piped.pid; wait").dir(ws.path()).piped()]),
        chain("detacher", vec![sh("sleep 30 & echo $! > buffered.pid").dir(ws.path())]),
    ];

    let run = tokio::spawn({
        let manager = Arc::clone(&manager);
        let token = token.clone();
        async move { manager.execute_parallel(&token, chains).await }
    });

    tokio::time::sleep(Duration::from_millis(300)).await;
    let children: Vec<i32> = ["piped.pid", "buffered.pid"]
        .iter()
        .map(|file| {
            std::fs::read_to_string(ws.path().join(file))
                .expect("pid file was not written")
                .trim()
                .parse()
                .expect("pid file holds a pid")
        })
        .collect();
    assert!(children.iter().all(|pid| is_running(*pid)));

    manager.stop_all_commands().await;
    for pid in &children {
        assert!(!is_running(*pid), "group member {pid} survived stop_all");
    }

    let result = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("flow did not stop after stop_all")
        .unwrap();
    assert!(result.is_err());
    assert!(manager.registry().is_empty());
}

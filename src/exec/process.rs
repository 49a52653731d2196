//! Tracked child processes and their escalating shutdown.
//!
//! A spawned child is handed to a waiter task that owns it and publishes its
//! exit through a `watch` channel. [`ProcessHandle`] is the cheap, cloneable
//! view used by the runner and the process registry to signal the process
//! and await its reaping without sharing `&mut Child`.

use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use tokio::process::Child;
use tokio::sync::watch;

use super::signal::{group_alive, kill_group, signal_group};
use crate::error::ExecError;

/// Exit state published by a process waiter task.
#[derive(Clone, Debug)]
pub enum ExitState {
    Running,
    Exited(ExitStatus),
    WaitFailed(String),
}

impl ExitState {
    pub fn is_running(&self) -> bool {
        matches!(self, ExitState::Running)
    }

    /// Map the exit state to the outcome of a command.
    pub fn into_result(self) -> Result<(), ExecError> {
        match self {
            ExitState::Exited(status) if status.success() => Ok(()),
            ExitState::Exited(status) => Err(match (status.code(), status.signal()) {
                (Some(code), _) => ExecError::ExitStatus(code),
                (None, Some(sig)) => ExecError::Signaled(sig),
                (None, None) => ExecError::WaitFailed(status.to_string()),
            }),
            ExitState::WaitFailed(msg) => Err(ExecError::WaitFailed(msg)),
            ExitState::Running => Err(ExecError::WaitFailed("process is still running".into())),
        }
    }
}

/// Observer of a child process owned by a waiter task.
#[derive(Clone, Debug)]
pub struct ProcessHandle {
    pid: Pid,
    exit: watch::Receiver<ExitState>,
}

impl ProcessHandle {
    /// Move `child` into a waiter task and return a handle to it.
    ///
    /// Returns `None` when the child has already been reaped.
    pub fn track(mut child: Child) -> Option<Self> {
        let pid = i32::try_from(child.id()?).ok()?;
        let (exit_tx, exit_rx) = watch::channel(ExitState::Running);

        tokio::spawn(async move {
            let state = match child.wait().await {
                Ok(status) => ExitState::Exited(status),
                Err(e) => ExitState::WaitFailed(format!("process wait failed: {e}")),
            };
            let _ = exit_tx.send(state);
        });

        Some(Self {
            pid: Pid::from_raw(pid),
            exit: exit_rx,
        })
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn has_exited(&self) -> bool {
        !self.exit.borrow().is_running()
    }

    /// Wait until the process has been reaped.
    pub async fn wait(&self) -> ExitState {
        let mut exit = self.exit.clone();
        match exit.wait_for(|state| !state.is_running()).await {
            Ok(state) => (*state).clone(),
            Err(_) => ExitState::WaitFailed("process waiter stopped".into()),
        }
    }
}

/// How often group membership is polled while waiting for a group to empty.
const GROUP_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Upper bound on waiting for killed group members to disappear.
const GROUP_SETTLE_TIMEOUT: Duration = Duration::from_millis(500);

/// How a tracked process ended after [`terminate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
    /// The leader and its whole group were gone before any signal was sent.
    AlreadyExited,
    /// The group exited within the grace period.
    Graceful,
    /// The grace period elapsed and the group was killed.
    Killed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    SignalSent,
    Waiting,
    KillSent,
    Reaped,
}

/// Wait until the leader has been reaped and its group is empty.
async fn wait_group_stopped(handle: &ProcessHandle) -> ExitState {
    let state = handle.wait().await;
    while group_alive(handle.pid()) {
        tokio::time::sleep(GROUP_POLL_INTERVAL).await;
    }
    state
}

fn log_signal_error(key: &str, what: &str, err: Errno) {
    match err {
        Errno::ESRCH => tracing::debug!(cmd = key, "{what}: process group already gone"),
        _ => tracing::warn!(cmd = key, error = %err, "{what}: failed to signal process group"),
    }
}

/// Stop a tracked process and everything in its group: send `sig` to the
/// group, wait up to `grace` for the group to empty, then kill the group.
///
/// Group members that outlived the leader are signalled too. Always returns
/// after the leader has been reaped.
pub async fn terminate(key: &str, handle: &ProcessHandle, sig: Signal, grace: Duration) -> Termination {
    if handle.has_exited() && !group_alive(handle.pid()) {
        return Termination::AlreadyExited;
    }

    tracing::debug!(cmd = key, signal = sig.as_str(), "Sending signal to command group");
    if let Err(e) = signal_group(handle.pid(), sig) {
        log_signal_error(key, "Shutdown signal", e);
    }

    let mut phase = Phase::SignalSent;
    loop {
        phase = match phase {
            Phase::SignalSent => Phase::Waiting,
            Phase::Waiting => match tokio::time::timeout(grace, wait_group_stopped(handle)).await {
                Ok(ExitState::WaitFailed(msg)) => {
                    tracing::warn!(cmd = key, error = %msg, "Command finished with error during shutdown");
                    return Termination::Graceful;
                }
                Ok(_) => return Termination::Graceful,
                Err(_) => {
                    tracing::warn!(cmd = key, "Force killing command group after timeout");
                    if let Err(e) = kill_group(handle.pid()) {
                        log_signal_error(key, "Force kill", e);
                    }
                    Phase::KillSent
                }
            },
            Phase::KillSent => {
                handle.wait().await;
                if tokio::time::timeout(GROUP_SETTLE_TIMEOUT, wait_group_stopped(handle))
                    .await
                    .is_err()
                {
                    tracing::debug!(cmd = key, "Killed group members not yet reaped");
                }
                Phase::Reaped
            }
            Phase::Reaped => return Termination::Killed,
        };
    }
}

//! Process-group signalling.
//!
//! Every command is spawned as the leader of its own process group, so its
//! group id is its pid and one `killpg` reaches the command and everything it
//! started, even after the leader itself has exited. Only when the group
//! cannot be signalled does the signal go to the single process instead.

use std::sync::{PoisonError, RwLock};

use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::{self, Pid};

/// Deliver `sig` to the process group led by `pgid`.
///
/// Falls back to signalling only `pgid` as a process when the group does not
/// accept the signal, and never signals our own group.
pub fn signal_group(pgid: Pid, sig: Signal) -> nix::Result<()> {
    if pgid == unistd::getpgrp() {
        return signal::kill(pgid, sig);
    }
    match signal::killpg(pgid, sig) {
        Err(e @ (Errno::ESRCH | Errno::EPERM)) => {
            tracing::debug!(pgid = pgid.as_raw(), error = %e, "Process group not signalled, signalling process");
            signal::kill(pgid, sig)
        }
        other => other,
    }
}

/// Unconditionally kill the process group led by `pgid`.
pub fn kill_group(pgid: Pid) -> nix::Result<()> {
    signal_group(pgid, Signal::SIGKILL)
}

/// Whether any process is left in the group `pgid`.
///
/// Members that have exited but are not yet reaped still count.
pub fn group_alive(pgid: Pid) -> bool {
    !matches!(signal::killpg(pgid, None), Err(Errno::ESRCH))
}

/// The signal forwarded to child processes on shutdown.
///
/// Set at most once per run, read by every termination path. Defaults to
/// `SIGTERM`.
#[derive(Debug)]
pub struct ShutdownSignal {
    signal: RwLock<Signal>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self {
            signal: RwLock::new(Signal::SIGTERM),
        }
    }

    pub fn set(&self, sig: Signal) {
        *self.signal.write().unwrap_or_else(PoisonError::into_inner) = sig;
    }

    pub fn get(&self) -> Signal {
        *self.signal.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

//! Registry of running child processes.
//!
//! [`ProcessRegistry`] tracks every live command by a `<program>_<pid>` key
//! behind a read-mostly lock. Stop-all works on a snapshot so slow
//! signal/wait work never holds the lock while commands start and finish.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use futures::future::join_all;
use nix::sys::signal::Signal;

use crate::exec::process::{ProcessHandle, terminate};

/// Grace period between the shutdown signal and the forced kill.
pub const FORCE_KILL_TIMEOUT: Duration = Duration::from_secs(3);

/// Registry key for a running command instance.
pub fn process_key(program: &str, pid: u32) -> String {
    format!("{program}_{pid}")
}

/// Concurrency-safe bookkeeping of live child processes.
#[derive(Debug)]
pub struct ProcessRegistry {
    procs: RwLock<HashMap<String, ProcessHandle>>,
    kill_timeout: Duration,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::with_kill_timeout(FORCE_KILL_TIMEOUT)
    }

    pub fn with_kill_timeout(kill_timeout: Duration) -> Self {
        Self {
            procs: RwLock::new(HashMap::new()),
            kill_timeout,
        }
    }

    /// Grace period applied before force-killing a process group.
    pub fn kill_timeout(&self) -> Duration {
        self.kill_timeout
    }

    /// Track a process. Replaces any entry under the same key.
    pub fn add(&self, key: impl Into<String>, handle: ProcessHandle) {
        self.procs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), handle);
    }

    /// Stop tracking a process. Absent keys are ignored.
    pub fn remove(&self, key: &str) {
        self.procs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    /// Track a process until the returned guard is dropped.
    pub fn register(&self, key: impl Into<String>, handle: ProcessHandle) -> Registration<'_> {
        let key = key.into();
        self.add(key.clone(), handle);
        Registration {
            registry: self,
            key,
        }
    }

    /// Point-in-time copy of all tracked entries.
    pub fn snapshot(&self) -> HashMap<String, ProcessHandle> {
        self.procs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.procs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Signal every tracked process group with `sig`, force-kill the ones
    /// still alive after the kill timeout, and return once all are reaped.
    ///
    /// Failures on one entry are logged and never stop the sweep.
    pub async fn stop_all(&self, sig: Signal) {
        let procs = self.snapshot();
        if procs.is_empty() {
            return;
        }

        tracing::info!(count = procs.len(), "Stopping all running commands...");

        let sweeps = procs
            .iter()
            .map(|(key, handle)| terminate(key, handle, sig, self.kill_timeout));
        let outcomes = join_all(sweeps).await;

        tracing::debug!(?outcomes, "Stop-all sweep finished");
    }
}

impl Default for ProcessRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Removes its key from the registry when dropped.
#[derive(Debug)]
pub struct Registration<'a> {
    registry: &'a ProcessRegistry,
    key: String,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.registry.remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn_sleep() -> ProcessHandle {
        let child = tokio::process::Command::new("sleep")
            .arg("30")
            .process_group(0)
            .kill_on_drop(true)
            .spawn()
            .expect("failed to spawn sleep");
        ProcessHandle::track(child).unwrap()
    }

    #[test]
    fn process_key_joins_program_and_pid() {
        assert_eq!(process_key("npm", 4242), "npm_4242");
    }

    #[tokio::test]
    async fn add_remove_and_snapshot() {
        let reg = ProcessRegistry::new();
        let handle = spawn_sleep();

        reg.add("a", handle.clone());
        reg.add("a", handle.clone());
        reg.add("b", handle.clone());
        assert_eq!(reg.snapshot().len(), 2);

        reg.remove("a");
        reg.remove("missing");
        assert_eq!(reg.len(), 1);

        reg.stop_all(Signal::SIGKILL).await;
        reg.remove("b");
        assert!(reg.is_empty());
    }

    #[tokio::test]
    async fn registration_guard_removes_entry() {
        let reg = ProcessRegistry::new();
        let handle = spawn_sleep();
        {
            let _guard = reg.register("sleep_1", handle.clone());
            assert_eq!(reg.len(), 1);
            assert!(reg.snapshot().contains_key("sleep_1"));
        }
        assert!(reg.is_empty());

        reg.add("sleep_1", handle);
        reg.stop_all(Signal::SIGTERM).await;
    }

    #[tokio::test]
    async fn snapshot_is_detached_from_registry() {
        let reg = ProcessRegistry::new();
        let handle = spawn_sleep();
        reg.add("k", handle);

        let snap = reg.snapshot();
        reg.remove("k");
        assert_eq!(snap.len(), 1);
        assert!(reg.is_empty());

        for (key, handle) in &snap {
            terminate(key, handle, Signal::SIGKILL, FORCE_KILL_TIMEOUT).await;
        }
    }

    #[tokio::test]
    async fn stop_all_on_empty_registry_returns_immediately() {
        let reg = ProcessRegistry::with_kill_timeout(Duration::from_millis(10));
        reg.stop_all(Signal::SIGTERM).await;
        assert_eq!(reg.kill_timeout(), Duration::from_millis(10));
    }
}

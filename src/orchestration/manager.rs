//! Entry point for running flows.
//!
//! [`Manager`] wires together the [`ProcessRegistry`], the shared shutdown
//! signal, the [`ProcessRunner`] and a [`ChainExecutor`] whose stop-all hook
//! sweeps the registry. It is designed to be wrapped in `Arc` and shared with
//! the signal-handling task.
//!
//! **Shutdown model:** the signal that stops commands is configurable at
//! runtime (the CLI replays whatever signal it received). Cancelling the
//! token passed to [`Manager::execute_parallel`] triggers one stop-all sweep
//! and cancels every chain; each runner also stops its own process, which is
//! harmless when the sweep got there first.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use nix::sys::signal::Signal;
use tokio_util::sync::CancellationToken;

use super::chain_executor::{ChainExecutor, StopAllFn};
use super::registry::{FORCE_KILL_TIMEOUT, ProcessRegistry};
use super::types::{Command, CommandChain};
use crate::error::ExecError;
use crate::exec::runner::{CommandRunner, ProcessRunner};
use crate::exec::signal::ShutdownSignal;

/// Runs command chains as OS processes and stops them on demand.
///
/// # Example
///
/// ```ignore
/// let manager = Arc::new(Manager::new());
/// let token = CancellationToken::new();
/// manager.execute_parallel(&token, flow.chains).await?;
/// ```
pub struct Manager {
    registry: Arc<ProcessRegistry>,
    shutdown: Arc<ShutdownSignal>,
    executor: ChainExecutor<ProcessRunner>,
}

impl Manager {
    pub fn new() -> Self {
        Self::with_kill_timeout(FORCE_KILL_TIMEOUT)
    }

    /// Create a manager whose stop-all waits `kill_timeout` before `SIGKILL`.
    pub fn with_kill_timeout(kill_timeout: Duration) -> Self {
        let registry = Arc::new(ProcessRegistry::with_kill_timeout(kill_timeout));
        let shutdown = Arc::new(ShutdownSignal::new());
        let runner = Arc::new(ProcessRunner::new(Arc::clone(&registry), Arc::clone(&shutdown)));

        let stop_all: StopAllFn = {
            let registry = Arc::clone(&registry);
            let shutdown = Arc::clone(&shutdown);
            Arc::new(move || {
                let registry = Arc::clone(&registry);
                let sig = shutdown.get();
                async move { registry.stop_all(sig).await }.boxed()
            })
        };

        Self {
            registry,
            shutdown,
            executor: ChainExecutor::new(runner, Some(stop_all)),
        }
    }

    /// Use `sig` for every subsequent stop request.
    pub fn set_shutdown_signal(&self, sig: Signal) {
        self.shutdown.set(sig);
    }

    pub fn shutdown_signal(&self) -> Signal {
        self.shutdown.get()
    }

    pub fn registry(&self) -> &Arc<ProcessRegistry> {
        &self.registry
    }

    /// Stop every running command with the current shutdown signal.
    ///
    /// Groups still alive after the kill timeout are force-killed. Returns
    /// once every process that was running at call time has been reaped.
    pub async fn stop_all_commands(&self) {
        self.registry.stop_all(self.shutdown.get()).await;
    }

    /// Run `chains` concurrently. See [`ChainExecutor::execute_parallel`].
    pub async fn execute_parallel(
        &self,
        cancel: &CancellationToken,
        chains: Vec<CommandChain>,
    ) -> Result<(), ExecError> {
        tracing::info!(chains = chains.len(), "Starting command chains");
        self.executor.execute_parallel(cancel, chains).await
    }

    /// Run a single command in buffered mode.
    pub async fn execute(
        &self,
        cancel: &CancellationToken,
        chain: &CommandChain,
        command: &Command,
    ) -> Result<(), ExecError> {
        self.executor.runner().execute(cancel, chain, command).await
    }

    /// Run a single command in streaming mode.
    pub async fn execute_with_pipe(
        &self,
        cancel: &CancellationToken,
        chain: &CommandChain,
        command: &Command,
    ) -> Result<(), ExecError> {
        self.executor.runner().execute_with_pipe(cancel, chain, command).await
    }
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}

//! Concurrent execution of command chains.
//!
//! Every chain runs in its own task. Inside a chain, commands run in declared
//! order and block the chain until they exit, except `pipe` commands, which
//! are launched in the background and joined before the chain completes.
//!
//! **Error model:** a chain reports at most one error. A synchronous command
//! failure outranks a piped command failure, and a plain cancellation is only
//! reported when nothing else went wrong. Across chains, the first
//! non-cancellation error observed while draining is returned.

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

use super::types::{ChainState, Command, CommandChain};
use crate::error::ExecError;
use crate::exec::runner::CommandRunner;
use crate::logging::{Blocks, Severity};

/// Hook that stops every running process when the run is cancelled.
pub type StopAllFn = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Runs chains of commands on top of a [`CommandRunner`].
pub struct ChainExecutor<R> {
    runner: Arc<R>,
    stop_all: Option<StopAllFn>,
}

impl<R> Clone for ChainExecutor<R> {
    fn clone(&self) -> Self {
        Self {
            runner: Arc::clone(&self.runner),
            stop_all: self.stop_all.clone(),
        }
    }
}

impl<R: CommandRunner> ChainExecutor<R> {
    pub fn new(runner: Arc<R>, stop_all: Option<StopAllFn>) -> Self {
        Self { runner, stop_all }
    }

    pub fn runner(&self) -> &Arc<R> {
        &self.runner
    }

    /// Run all chains concurrently and commands within a chain sequentially.
    ///
    /// When `cancel` fires, the stop-all hook runs and every chain is
    /// cancelled. Returns the first non-cancellation chain error, or
    /// [`ExecError::Cancelled`] if the run was cancelled without any.
    pub async fn execute_parallel(
        &self,
        cancel: &CancellationToken,
        chains: Vec<CommandChain>,
    ) -> Result<(), ExecError> {
        let run_cancel = cancel.child_token();
        let _run_guard = run_cancel.clone().drop_guard();
        let finished = CancellationToken::new();

        let mut tasks = JoinSet::new();
        for chain in chains {
            let runner = Arc::clone(&self.runner);
            let token = run_cancel.clone();
            tasks.spawn(async move { run_chain(runner, token, Arc::new(chain)).await });
        }

        let fan_in = async {
            let mut first_error = None;
            while let Some(joined) = tasks.join_next().await {
                match flatten(joined) {
                    Err(e) if !e.is_cancelled() => {
                        first_error.get_or_insert(e);
                    }
                    _ => {}
                }
            }
            finished.cancel();
            first_error
        };

        let watcher = async {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("Shutdown signal received, stopping all commands...");
                    if let Some(stop_all) = &self.stop_all {
                        stop_all().await;
                    }
                    run_cancel.cancel();
                }
                _ = finished.cancelled() => {}
            }
        };

        let (first_error, ()) = tokio::join!(fan_in, watcher);

        match first_error {
            Some(e) => Err(e),
            None if cancel.is_cancelled() => Err(ExecError::Cancelled),
            None => Ok(()),
        }
    }
}

/// Run one chain's commands and resolve the chain's outcome.
async fn run_chain<R: CommandRunner>(
    runner: Arc<R>,
    cancel: CancellationToken,
    chain: Arc<CommandChain>,
) -> Result<(), ExecError> {
    tracing::debug!(chain = %chain.name, state = %ChainState::Pending, "Chain scheduled");

    let mut piped: JoinSet<Result<(), ExecError>> = JoinSet::new();
    let mut sync_error = None;

    for command in chain.commands() {
        if cancel.is_cancelled() {
            sync_error = Some(ExecError::Cancelled);
            break;
        }

        if command.disabled {
            Blocks::new()
                .text("Command is disabled, skipping:")
                .pair("chain", &chain.name)
                .pair("command", command.name())
                .emit(Severity::Info);
            continue;
        }

        tracing::debug!(chain = %chain.name, cmd = %command.name(), state = %ChainState::Running, "Running command");

        if command.pipe {
            piped.spawn(run_piped(
                Arc::clone(&runner),
                cancel.clone(),
                Arc::clone(&chain),
                command.clone(),
            ));
            continue;
        }

        if let Err(e) = runner.execute(&cancel, &chain, command).await {
            sync_error = Some(e);
            break;
        }
    }

    // Piped commands are always drained, even after a synchronous failure.
    let mut pipe_error = None;
    while let Some(joined) = piped.join_next().await {
        match flatten(joined) {
            Err(e) if !e.is_cancelled() => {
                pipe_error.get_or_insert(e);
            }
            _ => {}
        }
    }

    let outcome = match (sync_error, pipe_error) {
        (Some(e), _) if !e.is_cancelled() => Err(e),
        (_, Some(e)) => Err(e),
        (Some(cancelled), None) => Err(cancelled),
        (None, None) if cancel.is_cancelled() => Err(ExecError::Cancelled),
        (None, None) => Ok(()),
    };

    let state = ChainState::from_outcome(&outcome);
    match &outcome {
        Err(e) if state == ChainState::Failed => {
            tracing::error!(chain = %chain.name, state = %state, error = %e, "Chain finished");
        }
        _ => tracing::info!(chain = %chain.name, state = %state, "Chain finished"),
    }

    outcome
}

async fn run_piped<R: CommandRunner>(
    runner: Arc<R>,
    cancel: CancellationToken,
    chain: Arc<CommandChain>,
    command: Command,
) -> Result<(), ExecError> {
    runner.execute_with_pipe(&cancel, &chain, &command).await
}

fn flatten(joined: Result<Result<(), ExecError>, JoinError>) -> Result<(), ExecError> {
    joined.unwrap_or_else(|e| Err(ExecError::TaskFailed(e.to_string())))
}

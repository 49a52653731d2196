//! How a whole run ended, as reported by the binary.

use crate::error::ExecError;

/// Final state of [`Manager::execute_parallel`](super::manager::Manager::execute_parallel).
#[derive(Debug)]
pub enum RunOutcome {
    /// Every chain ran to completion.
    Completed,
    /// The run was cancelled and nothing else went wrong.
    Stopped,
    /// The run did not finish within the shutdown grace window.
    TimedOut,
    /// A command or chain failed.
    Failed(ExecError),
}

impl From<Result<(), ExecError>> for RunOutcome {
    fn from(result: Result<(), ExecError>) -> Self {
        match result {
            Ok(()) => RunOutcome::Completed,
            Err(e) if e.is_cancelled() => RunOutcome::Stopped,
            Err(e) => RunOutcome::Failed(e),
        }
    }
}

impl RunOutcome {
    /// Log the outcome. `during_shutdown` is set when the run was waited on
    /// after a shutdown signal.
    pub fn log(&self, during_shutdown: bool) {
        match self {
            RunOutcome::Completed if !during_shutdown => {
                tracing::info!("All commands completed successfully")
            }
            RunOutcome::Completed | RunOutcome::Stopped => {
                tracing::info!("All commands stopped gracefully")
            }
            RunOutcome::TimedOut => {
                tracing::warn!("Shutdown timeout reached, some commands may have been force-killed")
            }
            RunOutcome::Failed(e) if during_shutdown => {
                tracing::error!(error = %e, "Error during shutdown")
            }
            RunOutcome::Failed(e) => tracing::error!(error = %e, "Failed to run parallel execution"),
        }
    }

    /// Only a failure is an error; stopping on request exits cleanly.
    pub fn into_result(self) -> Result<(), ExecError> {
        match self {
            RunOutcome::Failed(e) => Err(e),
            RunOutcome::Completed | RunOutcome::Stopped | RunOutcome::TimedOut => Ok(()),
        }
    }
}

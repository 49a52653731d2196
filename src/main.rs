use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use nix::sys::signal::Signal;
use tokio::signal::unix::{Signal as SignalStream, SignalKind, signal};
use tokio_util::sync::CancellationToken;

use parallel::cli::Cli;
use parallel::config;
use parallel::logging;
use parallel::orchestration::manager::Manager;
use parallel::orchestration::outcome::RunOutcome;

/// The OS signals that start a graceful shutdown.
struct ShutdownSignals {
    interrupt: SignalStream,
    terminate: SignalStream,
    quit: SignalStream,
}

impl ShutdownSignals {
    fn install() -> anyhow::Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?,
            terminate: signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?,
            quit: signal(SignalKind::quit()).context("Failed to install SIGQUIT handler")?,
        })
    }

    /// Wait for the first shutdown signal.
    async fn recv(&mut self) -> Signal {
        tokio::select! {
            _ = self.interrupt.recv() => Signal::SIGINT,
            _ = self.terminate.recv() => Signal::SIGTERM,
            _ = self.quit.recv() => Signal::SIGQUIT,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_level);
    tracing::debug!(file = %cli.file.display(), "Parallel starting");

    let flow = config::load_flow(&cli.file).inspect_err(|e| {
        tracing::error!(error = %e, "Failed to load configuration file");
    })?;
    tracing::info!("{}", flow.outline());

    let manager = Arc::new(Manager::with_kill_timeout(cli.kill_timeout()));
    let cancel = CancellationToken::new();

    // The first signal decides how commands are stopped.
    let mut signals = ShutdownSignals::install()?;
    let signal_task = tokio::spawn({
        let manager = Arc::clone(&manager);
        let cancel = cancel.clone();
        async move {
            let sig = signals.recv().await;
            tracing::info!(signal = sig.as_str(), "Shutdown signal received");
            manager.set_shutdown_signal(sig);
            cancel.cancel();
        }
    });

    let mut run = tokio::spawn({
        let manager = Arc::clone(&manager);
        let cancel = cancel.clone();
        async move { manager.execute_parallel(&cancel, flow.chains).await }
    });

    let finished = tokio::select! {
        joined = &mut run => Some(joined),
        _ = cancel.cancelled() => None,
    };

    let outcome = match finished {
        Some(joined) => {
            let outcome = RunOutcome::from(joined.context("Execution task failed")?);
            outcome.log(false);
            outcome
        }
        None => {
            tracing::info!("Shutdown signal received, waiting for commands to stop...");
            let outcome = match tokio::time::timeout(cli.grace_timeout(), &mut run).await {
                Ok(joined) => RunOutcome::from(joined.context("Execution task failed")?),
                Err(_) => RunOutcome::TimedOut,
            };
            outcome.log(true);
            outcome
        }
    };

    signal_task.abort();
    tracing::debug!("Parallel finished");

    outcome.into_result()?;
    Ok(())
}

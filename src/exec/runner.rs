//! Command runner.
//!
//! Runs one [`Command`] to completion against a [`CancellationToken`].
//!
//! Every command:
//! - Runs in its own process group (`process_group(0)`) so the whole subtree
//!   can be signalled as a unit
//! - Has `kill_on_drop(true)` as a safety net
//! - Is tracked in the [`ProcessRegistry`] from spawn until the call returns
//! - On cancellation gets the shutdown signal, a grace period, then `SIGKILL`
//!
//! Buffered mode sends stdout and stderr into one shared pipe and logs the
//! combined output once on exit. Streaming mode logs each line as it arrives;
//! if the group still holds the pipes after the drain window it is stopped.

use std::future::Future;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use nix::fcntl::OFlag;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::unix::pipe;
use tokio::process::{ChildStderr, ChildStdout};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::output::{LineContext, OutputLine, forward_lines};
use super::process::{ExitState, ProcessHandle, terminate};
use super::signal::ShutdownSignal;
use crate::error::ExecError;
use crate::logging::{Blocks, DIVIDER, Severity, divider};
use crate::orchestration::registry::{ProcessRegistry, process_key};
use crate::orchestration::types::{Command, CommandChain};

/// Indentation applied to every line of buffered output.
pub const OUTPUT_INDENTATION: &str = "          ";

/// How long stream readers may keep draining after the process exited.
pub const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Executes single commands on behalf of the chain executor.
pub trait CommandRunner: Send + Sync + 'static {
    /// Run `command` to completion, logging its collected output once.
    fn execute(
        &self,
        cancel: &CancellationToken,
        chain: &CommandChain,
        command: &Command,
    ) -> impl Future<Output = Result<(), ExecError>> + Send;

    /// Run `command` to completion, logging each output line as it arrives.
    fn execute_with_pipe(
        &self,
        cancel: &CancellationToken,
        chain: &CommandChain,
        command: &Command,
    ) -> impl Future<Output = Result<(), ExecError>> + Send;
}

/// A spawned command. The output pipes are present when they were requested
/// with [`Stdio::piped`].
struct Launched {
    key: String,
    handle: ProcessHandle,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
}

/// Runs commands as OS processes.
#[derive(Clone, Debug)]
pub struct ProcessRunner {
    registry: Arc<ProcessRegistry>,
    shutdown: Arc<ShutdownSignal>,
}

impl ProcessRunner {
    pub fn new(registry: Arc<ProcessRegistry>, shutdown: Arc<ShutdownSignal>) -> Self {
        Self { registry, shutdown }
    }

    /// Spawn `command` in a fresh process group.
    fn launch(&self, command: &Command, stdout: Stdio, stderr: Stdio) -> Result<Launched, ExecError> {
        let mut cmd = tokio::process::Command::new(&command.program);
        cmd.args(&command.args)
            .process_group(0)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .kill_on_drop(true);
        if let Some(dir) = &command.dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|source| {
            tracing::error!(cmd = %command.program, error = %source, "Failed to start command");
            ExecError::SpawnFailed {
                program: command.program.clone(),
                source,
            }
        })?;

        let pid = child.id().unwrap_or_default();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let handle = ProcessHandle::track(child)
            .ok_or_else(|| ExecError::WaitFailed("process exited before it was tracked".into()))?;

        tracing::info!("Command started: {}", command.display_name());

        Ok(Launched {
            key: process_key(&command.program, pid),
            handle,
            stdout,
            stderr,
        })
    }

    /// Stop a running command after its context was cancelled.
    async fn stop(&self, key: &str, handle: &ProcessHandle) {
        tracing::info!(cmd = key, "Context canceled, stopping command");
        terminate(key, handle, self.shutdown.get(), self.registry.kill_timeout()).await;
    }
}

/// Resolve the outcome of an exited command.
///
/// A failed exit observed after the context was cancelled is reported as a
/// cancellation, never as an execution failure.
fn exit_outcome(cancel: &CancellationToken, state: ExitState) -> Result<(), ExecError> {
    match state.into_result() {
        Err(_) if cancel.is_cancelled() => Err(ExecError::Cancelled),
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            Err(e)
        }
        Ok(()) => Ok(()),
    }
}

/// A single pipe whose write end serves as both stdout and stderr, so the
/// reader sees the two streams in the order they were written.
///
/// Both ends are close-on-exec; the spawn duplicates the write end onto the
/// child's descriptors 1 and 2.
fn combined_pipe() -> Result<(pipe::Receiver, Stdio, Stdio), ExecError> {
    let (read, write) = nix::unistd::pipe2(OFlag::O_CLOEXEC)
        .map_err(|e| ExecError::PipeSetup(e.into()))?;
    let write_err = write.try_clone().map_err(ExecError::PipeSetup)?;
    let receiver = pipe::Receiver::from_owned_fd(read).map_err(ExecError::PipeSetup)?;
    Ok((receiver, Stdio::from(write), Stdio::from(write_err)))
}

/// Append everything read from `reader` to `sink`.
async fn capture_into<R: AsyncRead + Unpin>(mut reader: R, sink: &mut Vec<u8>) {
    if let Err(e) = reader.read_to_end(sink).await {
        tracing::warn!(error = %e, "Failed reading command output");
    }
}

/// Indent every captured line for a readable log block.
fn indent_output(output: &[u8]) -> String {
    let text = String::from_utf8_lossy(output);
    let mut content = String::from("\n");
    for line in text.split('\n') {
        content.push_str(OUTPUT_INDENTATION);
        content.push_str(line);
        content.push('\n');
    }
    content
}

impl CommandRunner for ProcessRunner {
    async fn execute(
        &self,
        cancel: &CancellationToken,
        chain: &CommandChain,
        command: &Command,
    ) -> Result<(), ExecError> {
        let (reader, stdout, stderr) = combined_pipe()?;
        let Launched { key, handle, .. } = self.launch(command, stdout, stderr)?;
        let _registration = self.registry.register(key.clone(), handle.clone());

        let mut output = Vec::new();
        let state = {
            let run = async {
                let (_, state) = tokio::join!(capture_into(reader, &mut output), handle.wait());
                state
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.stop(&key, &handle).await;
                    return Err(ExecError::Cancelled);
                }
                state = run => state,
            }
        };

        let outcome = exit_outcome(cancel, state);
        if outcome.as_ref().is_err_and(ExecError::is_cancelled) {
            return outcome;
        }

        let blocks = Blocks::new()
            .text(chain.color.wrap(&format!("{}{DIVIDER}", chain.header())))
            .text(command.display_name())
            .text(indent_output(&output));

        match &outcome {
            Ok(()) => blocks.emit(Severity::Info),
            Err(e) => blocks.pair("error", e).emit(Severity::Error),
        }

        outcome
    }

    async fn execute_with_pipe(
        &self,
        cancel: &CancellationToken,
        chain: &CommandChain,
        command: &Command,
    ) -> Result<(), ExecError> {
        let Launched {
            key,
            handle,
            stdout,
            stderr,
        } = self.launch(command, Stdio::piped(), Stdio::piped())?;
        let _registration = self.registry.register(key.clone(), handle.clone());
        let stdout = stdout.ok_or(ExecError::PipeCreation("stdout"))?;
        let stderr = stderr.ok_or(ExecError::PipeCreation("stderr"))?;

        // Readers stop as soon as the command's context ends, or when this call returns.
        let output_cancel = cancel.child_token();
        let _stop_readers = output_cancel.clone().drop_guard();
        let context = LineContext::new(chain, command);

        let stdout_reader = spawn_reader(output_cancel.clone(), stdout, context.clone(), |line| {
            Blocks::new()
                .text(line.chain)
                .text(format!("{} ({}) {}", line.command, line.counter, divider()))
                .text(line.content)
                .emit(Severity::Info);
        });
        let stderr_reader = spawn_reader(output_cancel.clone(), stderr, context, |line| {
            Blocks::new()
                .text(line.chain)
                .text(line.command)
                .text(line.content)
                .emit(Severity::Error);
        });

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                output_cancel.cancel();
                self.stop(&key, &handle).await;
                join_reader(stdout_reader).await;
                join_reader(stderr_reader).await;
                Err(ExecError::Cancelled)
            }
            state = handle.wait() => {
                let drain = async {
                    join_reader(stdout_reader).await;
                    join_reader(stderr_reader).await;
                };
                if tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, drain).await.is_err() {
                    // Leftover group members would outlive their registration.
                    tracing::info!(cmd = %key, "Output still open after exit, stopping process group");
                    output_cancel.cancel();
                    terminate(&key, &handle, self.shutdown.get(), self.registry.kill_timeout()).await;
                }
                exit_outcome(cancel, state)
            }
        }
    }
}

/// Spawn a task forwarding one output stream line by line.
fn spawn_reader<R, F>(
    cancel: CancellationToken,
    reader: R,
    context: LineContext,
    handler: F,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    F: FnMut(OutputLine<'_>) + Send + 'static,
{
    tokio::spawn(async move {
        match forward_lines(&cancel, reader, &context, handler).await {
            Ok(_) => {}
            Err(e) if e.is_cancelled() => {}
            Err(e) => tracing::error!(cmd = %context.command, error = %e, "Output reader failed"),
        }
    })
}

async fn join_reader(reader: JoinHandle<()>) {
    if let Err(e) = reader.await {
        tracing::warn!(error = %e, "Output reader task failed");
    }
}

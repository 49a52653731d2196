//! Line-by-line output forwarding.
//!
//! [`forward_lines`] turns a raw byte stream into trimmed text lines and hands
//! each one, with its chain/command context and a zero-based per-stream
//! counter, to a caller-supplied handler. Independent streams (stdout and
//! stderr of one command, or different commands) each get their own call.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio_util::sync::CancellationToken;

use crate::error::ExecError;
use crate::logging::divider;
use crate::orchestration::types::{Command, CommandChain};

/// Display context attached to every line of one command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineContext {
    /// Colored chain header followed by the divider.
    pub chain: String,
    /// Formatted command display name.
    pub command: String,
}

impl LineContext {
    pub fn new(chain: &CommandChain, command: &Command) -> Self {
        Self {
            chain: format!("{} {}", chain.color.wrap(&chain.header()), divider()),
            command: command.display_name(),
        }
    }
}

/// A single line read from a command stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutputLine<'a> {
    pub chain: &'a str,
    pub command: &'a str,
    pub content: &'a str,
    pub counter: usize,
}

/// Read `reader` until end of stream, forwarding each line to `handler`.
///
/// Stops with [`ExecError::Cancelled`] as soon as `cancel` fires, even in the
/// middle of a read, and with [`ExecError::OutputRead`] on a read error. A
/// final line without a trailing newline is still delivered. Returns the
/// number of lines delivered.
pub async fn forward_lines<R, F>(
    cancel: &CancellationToken,
    reader: R,
    context: &LineContext,
    mut handler: F,
) -> Result<usize, ExecError>
where
    R: AsyncRead + Unpin,
    F: FnMut(OutputLine<'_>),
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut counter = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(ExecError::Cancelled);
        }

        buf.clear();
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ExecError::Cancelled),
            read = reader.read_until(b'\n', &mut buf) => read.map_err(ExecError::OutputRead)?,
        };
        if read == 0 {
            return Ok(counter);
        }

        let text = String::from_utf8_lossy(&buf);
        handler(OutputLine {
            chain: &context.chain,
            command: &context.command,
            content: text.trim_end_matches(['\n', '\r']),
            counter,
        });
        counter += 1;
    }
}

//! Process execution.
//!
//! - [`runner`]: the [`runner::CommandRunner`] seam and its OS-process implementation
//! - [`process`]: tracked children and escalating termination
//! - [`signal`]: process-group signalling and the shared shutdown signal
//! - [`output`]: line-by-line forwarding of command output

pub mod output;
pub mod process;
pub mod runner;
pub mod signal;

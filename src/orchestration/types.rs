//! Domain model for command chains.
//!
//! A [`Flow`] owns its [`CommandChain`]s and each chain owns its
//! [`Command`]s. Commands carry no pointer back to their chain: the chain is
//! passed alongside the command wherever its name or color is needed.

use std::fmt::{self, Write as _};
use std::path::PathBuf;

use crate::error::{ExecError, FlowError};
use crate::logging::ChainColor;

/// Placeholder replaced by the command name in a name template.
pub const CMD_NAME_TEMPLATE: &str = "%CMD_NAME%";
/// Placeholder replaced by the space-joined arguments in a name template.
pub const CMD_ARGS_TEMPLATE: &str = "%CMD_ARGS%";

/// Display options for a command.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Format {
    /// Display-name template using [`CMD_NAME_TEMPLATE`] and [`CMD_ARGS_TEMPLATE`].
    pub cmd_name: Option<String>,
}

/// A single OS command inside a chain.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Command {
    /// Human-readable name; falls back to the program when unset.
    pub name: Option<String>,
    pub program: String,
    pub args: Vec<String>,
    /// Working directory; inherits ours when unset.
    pub dir: Option<PathBuf>,
    /// Run without blocking later commands in the chain and stream output.
    pub pipe: bool,
    /// Skip the command entirely.
    pub disabled: bool,
    pub format: Format,
}

impl Command {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    pub fn piped(mut self) -> Self {
        self.pipe = true;
        self
    }

    pub fn disable(mut self) -> Self {
        self.disabled = true;
        self
    }

    pub fn name_template(mut self, template: impl Into<String>) -> Self {
        self.format.cmd_name = Some(template.into());
        self
    }

    /// The configured name, or the program when no name is set.
    pub fn name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &self.program,
        }
    }

    /// Name used in log output.
    ///
    /// With a template, the name and argument placeholders are substituted;
    /// otherwise the name is followed by the space-joined arguments.
    pub fn display_name(&self) -> String {
        let args = self.args.join(" ");
        match self.format.cmd_name.as_deref() {
            Some(template) if !template.is_empty() => template
                .replace(CMD_NAME_TEMPLATE, self.name())
                .replace(CMD_ARGS_TEMPLATE, &args),
            _ if args.is_empty() => self.name().to_string(),
            _ => format!("{} {args}", self.name()),
        }
    }

    pub fn validate(&self, chain: &str) -> Result<(), FlowError> {
        if self.program.trim().is_empty() {
            return Err(FlowError::EmptyProgram {
                chain: chain.to_string(),
                command: self.name().to_string(),
            });
        }
        Ok(())
    }
}

/// An ordered list of commands sharing a display name and color.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandChain {
    pub name: String,
    pub color: ChainColor,
    commands: Vec<Command>,
}

impl CommandChain {
    pub fn new(name: impl Into<String>, color: ChainColor) -> Self {
        Self {
            name: name.into(),
            color,
            commands: Vec::new(),
        }
    }

    pub fn add(&mut self, command: Command) {
        self.commands.push(command);
    }

    pub fn with_command(mut self, command: Command) -> Self {
        self.add(command);
        self
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Upper-cased chain name used as the log header.
    pub fn header(&self) -> String {
        self.name.to_uppercase()
    }
}

/// The full set of chains for one run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Flow {
    pub chains: Vec<CommandChain>,
}

impl Flow {
    pub fn add_chain(&mut self, chain: CommandChain) {
        self.chains.push(chain);
    }

    /// Check that the flow has at least one chain and every command names a program.
    pub fn validate(&self) -> Result<(), FlowError> {
        if self.chains.is_empty() {
            return Err(FlowError::EmptyFlow);
        }
        for chain in &self.chains {
            if chain.name.trim().is_empty() {
                return Err(FlowError::EmptyChainName);
            }
            for command in chain.commands() {
                command.validate(&chain.name)?;
            }
        }
        Ok(())
    }

    /// Human-readable outline of the chains and commands that will run.
    pub fn outline(&self) -> String {
        if self.chains.is_empty() {
            return "Flow has no chains defined".to_string();
        }

        let mut out = String::from("Flow structure:\n");
        for (i, chain) in self.chains.iter().enumerate() {
            let _ = writeln!(out, "  Chain {}: {}", i + 1, chain.name);
            if chain.commands().is_empty() {
                out.push_str("    (no commands)\n");
                continue;
            }
            for (j, cmd) in chain.commands().iter().enumerate() {
                let _ = writeln!(out, "    [{}] {}", j + 1, cmd.name());
                let _ = writeln!(out, "        Exec : {} {}", cmd.program, cmd.args.join(" "));
                if let Some(dir) = &cmd.dir {
                    let _ = writeln!(out, "        Dir  : {}", dir.display());
                }
                if cmd.pipe {
                    out.push_str("        Pipe : true\n");
                }
                if cmd.disabled {
                    out.push_str("        Disabled : true\n");
                }
                if let Some(template) = cmd.format.cmd_name.as_deref().filter(|t| !t.is_empty()) {
                    let _ = writeln!(out, "        Name : {template}");
                }
            }
        }
        out
    }
}

/// Lifecycle of one chain during a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChainState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ChainState {
    /// Terminal state for a finished chain.
    pub fn from_outcome(outcome: &Result<(), ExecError>) -> Self {
        match outcome {
            Ok(()) => ChainState::Completed,
            Err(e) if e.is_cancelled() => ChainState::Cancelled,
            Err(_) => ChainState::Failed,
        }
    }
}

impl fmt::Display for ChainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChainState::Pending => "pending",
            ChainState::Running => "running",
            ChainState::Completed => "completed",
            ChainState::Failed => "failed",
            ChainState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

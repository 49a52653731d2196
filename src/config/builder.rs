//! Conversion of a parsed [`ConfigFile`] into a runnable [`Flow`].

use std::path::PathBuf;

use super::schema::{CommandEntry, ConfigFile, DockerEntry};
use crate::error::ConfigError;
use crate::logging::ChainColor;
use crate::orchestration::types::{Command, CommandChain, Flow, Format};

const DOCKER_PROGRAM: &str = "docker";
const DEFAULT_DOCKER_CMD: &str = "run";
const DEFAULT_IMAGE_TAG: &str = "latest";

/// Builds flows, assigning each chain the next palette color.
#[derive(Debug, Clone)]
pub struct FlowBuilder {
    palette: Vec<ChainColor>,
}

impl FlowBuilder {
    pub fn new() -> Self {
        Self::with_palette(ChainColor::palette())
    }

    pub fn with_palette(palette: Vec<ChainColor>) -> Self {
        Self { palette }
    }

    /// Build chains and commands in declaration order.
    ///
    /// Colors cycle through the palette once it is exhausted.
    pub fn build(&self, config: ConfigFile) -> Result<Flow, ConfigError> {
        let commands = config.commands.ok_or(ConfigError::MissingCommands)?;

        let mut colors = self.palette.iter().copied().cycle();
        let mut flow = Flow::default();

        for (chain_name, entries) in commands {
            let color = colors.next().unwrap_or_default();
            let mut chain = CommandChain::new(chain_name, color);

            for (cmd_name, entry) in entries {
                let command = match &entry.docker {
                    Some(docker) => docker_command(&cmd_name, docker, &entry),
                    None => regular_command(&chain.name, &cmd_name, &entry)?,
                };
                chain.add(command);
            }

            tracing::debug!(chain = %chain.name, commands = chain.commands().len(), "Chain built");
            flow.add_chain(chain);
        }

        Ok(flow)
    }
}

impl Default for FlowBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn regular_command(chain: &str, name: &str, entry: &CommandEntry) -> Result<Command, ConfigError> {
    let (program, args) = entry
        .cmd
        .split_first()
        .ok_or_else(|| ConfigError::EmptyCommandLine {
            chain: chain.to_string(),
            command: name.to_string(),
        })?;

    Ok(Command {
        name: Some(name.to_string()),
        program: program.clone(),
        args: args.to_vec(),
        dir: working_dir(entry),
        pipe: entry.pipe,
        disabled: entry.disable,
        format: format(entry),
    })
}

/// `docker <cmd> --name <name> [--rm] [--pull P] [-p PORT]... <image>:<tag>`
///
/// Containers always stream their output.
fn docker_command(name: &str, docker: &DockerEntry, entry: &CommandEntry) -> Command {
    let subcommand = docker
        .cmd
        .as_deref()
        .filter(|c| !c.is_empty())
        .unwrap_or(DEFAULT_DOCKER_CMD);

    let mut args = vec![subcommand.to_string(), "--name".to_string(), name.to_string()];

    if docker.remove_after_all.is_none() {
        args.push("--rm".to_string());
    }

    if let Some(pull) = docker.image.pull.as_deref().filter(|p| !p.is_empty()) {
        args.extend(["--pull".to_string(), pull.to_string()]);
    }

    for port in &docker.ports {
        args.extend(["-p".to_string(), port.clone()]);
    }

    let tag = docker
        .image
        .tag
        .as_deref()
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_IMAGE_TAG);
    args.push(format!("{}:{tag}", docker.image.name));

    Command {
        name: Some(name.to_string()),
        program: DOCKER_PROGRAM.to_string(),
        args,
        dir: working_dir(entry),
        pipe: true,
        disabled: entry.disable,
        format: format(entry),
    }
}

fn working_dir(entry: &CommandEntry) -> Option<PathBuf> {
    entry.dir.clone().filter(|d| !d.as_os_str().is_empty())
}

fn format(entry: &CommandEntry) -> Format {
    Format {
        cmd_name: entry.format.cmd_name.clone(),
    }
}

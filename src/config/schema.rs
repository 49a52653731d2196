use serde::Deserialize;
use std::path::PathBuf;

use super::ordered::OrderedMap;

/// The file structure of `.parallelrc.yaml` (or its TOML equivalent).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Chain name -> command name -> command entry, in declaration order.
    pub commands: Option<OrderedMap<OrderedMap<CommandEntry>>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct CommandEntry {
    /// Program followed by its arguments.
    pub cmd: Vec<String>,
    /// Run a container instead of `cmd`.
    pub docker: Option<DockerEntry>,
    pub dir: Option<PathBuf>,
    pub pipe: bool,
    pub disable: bool,
    pub format: FormatEntry,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct FormatEntry {
    /// Display-name template using `%CMD_NAME%` and `%CMD_ARGS%`.
    pub cmd_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct DockerEntry {
    pub image: ImageEntry,
    /// Docker subcommand, `run` when absent.
    pub cmd: Option<String>,
    /// When absent the container is started with `--rm`.
    pub remove_after_all: Option<bool>,
    pub ports: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ImageEntry {
    pub name: String,
    pub tag: Option<String>,
    pub pull: Option<String>,
}

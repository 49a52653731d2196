pub mod builder;
pub mod ordered;
pub mod schema;

pub use builder::FlowBuilder;
pub use schema::*;

use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::orchestration::types::Flow;

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_PATH: &str = ".parallelrc.yaml";

/// Supported config file syntaxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Toml,
}

impl ConfigFormat {
    /// TOML for `.toml` files, YAML for everything else.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => ConfigFormat::Toml,
            _ => ConfigFormat::Yaml,
        }
    }
}

/// Read, parse, build and validate the flow described by `path`.
pub fn load_flow(path: &Path) -> Result<Flow, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(file = %path.display(), "Config file loaded");

    parse_flow(path, &contents)
}

/// Parse `contents` in the syntax implied by `path` and build a validated flow.
pub fn parse_flow(path: &Path, contents: &str) -> Result<Flow, ConfigError> {
    let config = parse_config(path, contents)?;
    let flow = FlowBuilder::new().build(config)?;
    flow.validate()?;

    tracing::debug!(chains = flow.chains.len(), "Config parsed");
    Ok(flow)
}

fn parse_config(path: &Path, contents: &str) -> Result<ConfigFile, ConfigError> {
    let parse_error = |message: String| ConfigError::Parse {
        path: PathBuf::from(path),
        message,
    };

    match ConfigFormat::from_path(path) {
        ConfigFormat::Yaml => serde_yaml::from_str(contents).map_err(|e| parse_error(e.to_string())),
        ConfigFormat::Toml => toml::from_str(contents).map_err(|e| parse_error(e.to_string())),
    }
}

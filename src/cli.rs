use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::DEFAULT_CONFIG_PATH;
use crate::version;

#[derive(Parser, Debug)]
#[command(
    name = "parallel",
    version = version::SHORT.as_str(),
    long_version = version::LONG.as_str(),
    about = "Run chains of commands concurrently with colored structured logs"
)]
pub struct Cli {
    /// Path to the YAML (or .toml) configuration file
    #[arg(short = 'f', long = "file", default_value = DEFAULT_CONFIG_PATH)]
    pub file: PathBuf,

    /// Seconds to wait for all commands to stop after a shutdown signal
    #[arg(long, default_value_t = 15)]
    pub grace_timeout: u64,

    /// Seconds a command may take to exit before its process group is killed
    #[arg(long, default_value_t = 3)]
    pub kill_timeout: u64,

    /// Default log level (RUST_LOG takes precedence)
    #[arg(long, default_value = "info")]
    pub log_level: tracing::Level,
}

impl Cli {
    pub fn grace_timeout(&self) -> Duration {
        Duration::from_secs(self.grace_timeout)
    }

    pub fn kill_timeout(&self) -> Duration {
        Duration::from_secs(self.kill_timeout)
    }
}

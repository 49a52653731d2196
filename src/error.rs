use std::path::PathBuf;

/// Errors related to running commands and chains.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("command execution failed: {program}: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("command execution failed: exit status {0}")]
    ExitStatus(i32),

    #[error("command execution failed: terminated by signal {0}")]
    Signaled(i32),

    #[error("command execution failed: {0}")]
    WaitFailed(String),

    #[error("pipe creation failed: {0} is not available")]
    PipeCreation(&'static str),

    #[error("pipe creation failed: {0}")]
    PipeSetup(#[source] std::io::Error),

    #[error("failed reading command output: {0}")]
    OutputRead(#[source] std::io::Error),

    #[error("task failed: {0}")]
    TaskFailed(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl ExecError {
    /// True when the error only reports that the surrounding context ended.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExecError::Cancelled)
    }
}

/// Errors raised when a flow is not fit for execution.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FlowError {
    #[error("flow must contain at least one chain")]
    EmptyFlow,

    #[error("chain name cannot be empty")]
    EmptyChainName,

    #[error("command cannot be empty (chain `{chain}`, command `{command}`)")]
    EmptyProgram { chain: String, command: String },
}

/// Errors related to configuration loading and parsing.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config at {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("missing config field `commands`")]
    MissingCommands,

    #[error("command `{command}` in chain `{chain}` has neither `cmd` nor `docker`")]
    EmptyCommandLine { chain: String, command: String },

    #[error("invalid flow configuration: {0}")]
    Invalid(#[from] FlowError),
}

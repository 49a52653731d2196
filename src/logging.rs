//! Log output for command chains.
//!
//! Lifecycle messages are plain `tracing` events. Command output is assembled
//! from [`Block`]s (a chain header, a command name, a body) and emitted as a
//! single event at a [`Severity`]. [`ChainColor::wrap`] is the only place
//! that produces ANSI color codes.

use std::fmt;

use crossterm::style::{Color, Stylize};
use tracing_subscriber::EnvFilter;

/// Symbol placed between the chain header and the command name.
pub const DIVIDER: &str = ">";

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over `default_level` when set.
pub fn init(default_level: tracing::Level) {
    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Display color assigned to a chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainColor(Option<Color>);

impl ChainColor {
    /// A color that leaves text untouched.
    pub const PLAIN: ChainColor = ChainColor(None);

    pub const fn new(color: Color) -> Self {
        Self(Some(color))
    }

    /// The chain palette: six base colors followed by their bright variants.
    pub fn palette() -> Vec<ChainColor> {
        [
            Color::DarkYellow,
            Color::DarkRed,
            Color::DarkBlue,
            Color::DarkGreen,
            Color::DarkCyan,
            Color::DarkMagenta,
            Color::Yellow,
            Color::Red,
            Color::Blue,
            Color::Green,
            Color::Cyan,
            Color::Magenta,
        ]
        .into_iter()
        .map(ChainColor::new)
        .collect()
    }

    /// Wrap `text` in this color's escape codes.
    pub fn wrap(&self, text: &str) -> String {
        match self.0 {
            Some(color) => text.with(color).to_string(),
            None => text.to_string(),
        }
    }
}

impl Default for ChainColor {
    fn default() -> Self {
        Self::PLAIN
    }
}

/// The colored divider that follows chain headers and streamed command names.
pub fn divider() -> String {
    ChainColor::new(Color::Magenta).wrap(DIVIDER)
}

/// Severity of an output event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Info,
    Error,
}

/// One piece of an output event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Block {
    /// Text rendered as-is.
    Text(String),
    /// A `name=value` pair; the name is highlighted.
    Pair { name: String, value: String },
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Block::Text(text) => f.write_str(text),
            Block::Pair { name, value } => {
                let key = ChainColor::new(Color::DarkCyan).wrap(&format!("{name}="));
                write!(f, "{key}{value}")
            }
        }
    }
}

/// An ordered list of blocks emitted as one log event.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Blocks(Vec<Block>);

impl Blocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        if !text.is_empty() {
            self.0.push(Block::Text(text));
        }
        self
    }

    pub fn pair(mut self, name: impl Into<String>, value: impl fmt::Display) -> Self {
        self.0.push(Block::Pair {
            name: name.into(),
            value: value.to_string(),
        });
        self
    }

    /// Render all blocks separated by single spaces.
    pub fn render(&self) -> String {
        self.0
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Emit the rendered blocks as a single tracing event.
    pub fn emit(&self, severity: Severity) {
        let message = self.render();
        match severity {
            Severity::Info => tracing::info!("{message}"),
            Severity::Error => tracing::error!("{message}"),
        }
    }
}

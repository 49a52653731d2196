//! Build and version metadata.
//!
//! Release builds may set `PARALLEL_COMMIT`, `PARALLEL_BUILD_DATE` and
//! `PARALLEL_BUILT_BY` at compile time; local builds fall back to defaults.

use std::sync::LazyLock;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const COMMIT: Option<&str> = option_env!("PARALLEL_COMMIT");
pub const BUILD_DATE: Option<&str> = option_env!("PARALLEL_BUILD_DATE");
pub const BUILT_BY: Option<&str> = option_env!("PARALLEL_BUILT_BY");

pub const DESCRIPTION: &str = "Parallel: run chains of commands concurrently with colored structured logs";

/// Single-line version, e.g. `0.1.0 (abc1234)`.
pub static SHORT: LazyLock<String> = LazyLock::new(|| short(VERSION, COMMIT));

/// Multi-line version block with build metadata.
pub static LONG: LazyLock<String> = LazyLock::new(|| long(VERSION, COMMIT, BUILD_DATE, BUILT_BY));

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn short(version: &str, commit: Option<&str>) -> String {
    match non_empty(commit) {
        Some(commit) => format!("{version} ({commit})"),
        None => version.to_string(),
    }
}

fn long(version: &str, commit: Option<&str>, date: Option<&str>, built_by: Option<&str>) -> String {
    format!(
        "{version}\n{DESCRIPTION}\nVersion:   {version}\nCommit:    {}\nBuilt at:  {}\nBuilt by:  {}\nOS/Arch:   {}/{}",
        non_empty(commit).unwrap_or("n/a"),
        non_empty(date).unwrap_or("n/a"),
        non_empty(built_by).unwrap_or("local"),
        std::env::consts::OS,
        std::env::consts::ARCH,
    )
}

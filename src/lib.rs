pub mod cli;
pub mod config;
pub mod error;
pub mod exec;
pub mod logging;
pub mod orchestration;
pub mod version;

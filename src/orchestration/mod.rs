//! Flow orchestration.
//!
//! Provides the flow model in [`types`], the [`registry::ProcessRegistry`] of
//! live child processes, the concurrent [`chain_executor::ChainExecutor`] and
//! the [`manager::Manager`] that ties them to real OS processes, and the
//! [`outcome::RunOutcome`] of a whole run.

pub mod chain_executor;
pub mod manager;
pub mod outcome;
pub mod registry;
pub mod types;

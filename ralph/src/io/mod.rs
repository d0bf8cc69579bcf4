//! I/O adapters for the loop: agent process, git, config and persisted state.

pub mod agent;
pub mod config;
pub mod git;
pub mod iteration_log;
pub mod process;
pub mod run_history;

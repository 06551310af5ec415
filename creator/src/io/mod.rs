//! Side-effecting helpers: config, chat backend, code execution and run records.

pub mod artifact;
pub mod cache;
pub mod config;
pub mod data;
pub mod human;
pub mod llm;
pub mod process;
pub mod prompt;
pub mod round_log;
pub mod run_log;
pub mod sandbox;
pub mod trace;

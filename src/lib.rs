//! Orchestration core for terminal-hosted AI coding agent workers.

#![forbid(unsafe_code)]

pub mod cli;
pub mod config;
pub mod errors;
pub mod models;
pub mod orchestrator;
pub mod process;
pub mod services;
pub mod telemetry;
pub mod terminal;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};

//! Wellbeing CLI library.
//!
//! This crate provides the `wb` command-line host over the usage pipeline,
//! the local database and the monitoring service.

mod cli;
pub mod commands;
mod config;
mod engine;

pub use cli::{Cli, Commands, LimitsAction};
pub use config::Config;
pub use engine::Engine;

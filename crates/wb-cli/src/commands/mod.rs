//! CLI subcommand implementations.

pub mod import;
pub mod limits;
pub mod monitor;
pub mod status;
pub mod sync;
pub mod usage;

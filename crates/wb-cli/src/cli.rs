//! Command-line argument definitions.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

/// Screen-time budgets over recorded app-switch events.
///
/// Reconstructs per-app foreground time, keeps daily history, and enforces
/// per-app limits while monitoring.
#[derive(Debug, Parser)]
#[command(name = "wb", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show database and sync status.
    Status,

    /// Import app-switch events and package metadata (JSONL) from stdin.
    Import,

    /// Show ranked per-app usage for a day.
    Usage {
        /// Local day to report (defaults to today so far).
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Manage per-app daily limits.
    #[command(subcommand)]
    Limits(LimitsAction),

    /// Sync completed days into history and refresh today's snapshot.
    Sync,

    /// Watch the foreground app and enforce limits until interrupted.
    Monitor {
        /// Stop after this many seconds instead of waiting for Ctrl-C.
        #[arg(long)]
        duration_secs: Option<u64>,
    },
}

/// Limit subcommands.
#[derive(Debug, Subcommand)]
pub enum LimitsAction {
    /// List configured limits.
    List,

    /// Set a daily limit for a package.
    Set {
        /// Package identifier.
        package: String,

        /// Daily budget in minutes.
        minutes: u32,

        /// Display name used in block notices.
        #[arg(long)]
        name: Option<String>,
    },

    /// Remove the limit for a package.
    Remove {
        /// Package identifier.
        package: String,
    },

    /// Disable the limit for a package without removing it.
    Disable {
        /// Package identifier.
        package: String,
    },
}

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use wb_cli::commands::{import, limits, monitor, status, sync, usage};
use wb_cli::{Cli, Commands, Config, Engine, LimitsAction};
use wb_core::SystemClock;

/// Load config and open database, ensuring the parent directory exists.
fn open_database(config_path: Option<&Path>) -> Result<(wb_db::Database, Config)> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }

    let db = wb_db::Database::open(&config.database_path).context("failed to open database")?;
    Ok((db, config))
}

fn open_engine(config_path: Option<&Path>) -> Result<(Engine, Config)> {
    let (db, config) = open_database(config_path)?;
    let engine =
        Engine::new(db, &config, Arc::new(SystemClock)).context("invalid configuration")?;
    Ok((engine, config))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let mut stdout = io::stdout();
    match &cli.command {
        Some(Commands::Status) => {
            let (db, config) = open_database(cli.config.as_deref())?;
            status::run(&mut stdout, &db, &config.database_path)?;
        }
        Some(Commands::Import) => {
            let (mut db, _config) = open_database(cli.config.as_deref())?;
            let summary = import::run(&mut db)?;
            tracing::info!(events = summary.events, packages = summary.packages, "import finished");
            writeln!(
                stdout,
                "Imported {} event(s) and {} package(s).",
                summary.events, summary.packages
            )?;
        }
        Some(Commands::Usage { date, json }) => {
            let (engine, _config) = open_engine(cli.config.as_deref())?;
            usage::run(
                &mut stdout,
                &engine.pipeline,
                engine.clock.as_ref(),
                *date,
                *json,
            )?;
        }
        Some(Commands::Limits(action)) => {
            let (mut db, _config) = open_database(cli.config.as_deref())?;
            match action {
                LimitsAction::List => limits::list(&mut stdout, &db)?,
                LimitsAction::Set {
                    package,
                    minutes,
                    name,
                } => limits::set(&mut stdout, &mut db, package, *minutes, name.as_deref())?,
                LimitsAction::Remove { package } => limits::remove(&mut stdout, &mut db, package)?,
                LimitsAction::Disable { package } => {
                    limits::disable(&mut stdout, &mut db, package)?;
                }
            }
        }
        Some(Commands::Sync) => {
            let (engine, config) = open_engine(cli.config.as_deref())?;
            sync::run(&mut stdout, &engine.historical_sync(&config))?;
        }
        Some(Commands::Monitor { duration_secs }) => {
            let (engine, config) = open_engine(cli.config.as_deref())?;
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("failed to start async runtime")?;
            runtime.block_on(monitor::run(
                &mut stdout,
                &engine,
                &config,
                duration_secs.map(Duration::from_secs),
            ))?;
        }
        None => {
            // No subcommand, show help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}

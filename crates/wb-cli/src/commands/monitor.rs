//! Monitor command: run the watcher, enforcer and sync scheduler in the foreground.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use wb_monitor::{BlockDispatcher, BlockRequest, MonitorDeps, MonitoringService};

use crate::{Config, Engine};

/// Reports blocks on the terminal.
#[derive(Debug, Default)]
pub struct ConsoleDispatcher;

impl BlockDispatcher for ConsoleDispatcher {
    fn dispatch(&self, request: &BlockRequest) {
        tracing::warn!(
            package = %request.package,
            limit_ms = request.limit_ms,
            "daily limit reached"
        );
        let mut stdout = std::io::stdout().lock();
        let _ = writeln!(stdout, "{}", block_notice(request));
    }
}

pub fn block_notice(request: &BlockRequest) -> String {
    format!(
        "Time's up: {} reached its {} daily limit ({}).",
        request.display_name, request.limit_formatted, request.package
    )
}

/// Monitors until Ctrl-C, or until `duration` has elapsed when given.
pub async fn run<W: Write>(
    writer: &mut W,
    engine: &Engine,
    config: &Config,
    duration: Option<Duration>,
) -> Result<()> {
    let deps = MonitorDeps {
        pipeline: Arc::clone(&engine.pipeline),
        limits: Arc::new(engine.db.clone()),
        dispatcher: Arc::new(ConsoleDispatcher),
        clock: Arc::clone(&engine.clock),
        sync: Some(Arc::new(engine.historical_sync(config))),
    };
    let monitor_config = config
        .monitor_config()
        .context("invalid monitoring configuration")?;
    let mut service = MonitoringService::new(deps, monitor_config);
    let mut state = service.state();

    service.start().context("failed to start monitoring")?;
    writeln!(writer, "Monitoring. Press Ctrl-C to stop.")?;

    let shutdown = async {
        match duration {
            Some(duration) => {
                tokio::time::sleep(duration).await;
                Ok(())
            }
            None => tokio::signal::ctrl_c().await,
        }
    };
    tokio::pin!(shutdown);

    let mut foreground = None;
    let result = loop {
        tokio::select! {
            biased;
            signal = &mut shutdown => break signal.context("failed to listen for Ctrl-C"),
            changed = state.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let current = state.borrow_and_update().current_foreground_app.clone();
                if current != foreground {
                    if let Some(app) = &current {
                        if let Err(err) = writeln!(writer, "Foreground: {app}") {
                            break Err(err.into());
                        }
                    }
                    foreground = current;
                }
            }
        }
    };

    service.stop().await;
    writeln!(writer, "Monitoring stopped.")?;
    result
}

//! The monitoring service: watcher, enforcer and sync scheduler under one token.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use wb_core::{Clock, HistoricalSync, LimitsSource, UsagePipeline};

use crate::enforcer::{BlockDispatcher, LimitEnforcer};
use crate::error::MonitorError;
use crate::scheduler::run_sync_schedule;
use crate::state::{MonitoringState, StateSender};
use crate::watcher::{ForegroundWatcher, WatcherConfig};

const CHANGE_CHANNEL_CAPACITY: usize = 16;

/// Monitoring timing.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub watcher: WatcherConfig,
    pub enforcer_interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            watcher: WatcherConfig::default(),
            enforcer_interval: Duration::from_millis(90_000),
        }
    }
}

/// Collaborators the service runs against.
#[derive(Clone)]
pub struct MonitorDeps {
    pub pipeline: Arc<UsagePipeline>,
    pub limits: Arc<dyn LimitsSource>,
    pub dispatcher: Arc<dyn BlockDispatcher>,
    pub clock: Arc<dyn Clock>,
    /// Historical sync to schedule alongside monitoring, if any.
    pub sync: Option<Arc<HistoricalSync>>,
}

struct Running {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

pub struct MonitoringService {
    deps: MonitorDeps,
    config: MonitorConfig,
    state: Arc<StateSender>,
    running: Option<Running>,
}

impl MonitoringService {
    pub fn new(deps: MonitorDeps, config: MonitorConfig) -> Self {
        let (state, _) = watch::channel(MonitoringState::default());
        Self {
            deps,
            config,
            state: Arc::new(state),
            running: None,
        }
    }

    pub const fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Observes the latest monitoring state.
    pub fn state(&self) -> watch::Receiver<MonitoringState> {
        self.state.subscribe()
    }

    /// Spawns the watcher, enforcer and sync scheduler tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) -> Result<(), MonitorError> {
        if self.running.is_some() {
            return Err(MonitorError::AlreadyRunning);
        }
        if !self.deps.pipeline.has_permission() {
            tracing::warn!("usage access not granted, monitoring not started");
            return Err(MonitorError::PermissionDenied);
        }
        let limits = self.deps.limits.enabled_limits()?;

        let token = CancellationToken::new();
        let (changes_tx, changes_rx) = mpsc::channel(CHANGE_CHANNEL_CAPACITY);
        let watcher = ForegroundWatcher::new(
            Arc::clone(&self.deps.pipeline),
            Arc::clone(&self.deps.clock),
            self.config.watcher.clone(),
            Arc::clone(&self.state),
            changes_tx,
        );
        let enforcer = LimitEnforcer::new(
            Arc::clone(&self.deps.pipeline),
            Arc::clone(&self.deps.limits),
            Arc::clone(&self.deps.dispatcher),
            Arc::clone(&self.deps.clock),
            self.config.enforcer_interval,
            Arc::clone(&self.state),
            token.child_token(),
        );

        let mut tasks = vec![
            tokio::spawn(watcher.run(token.child_token())),
            tokio::spawn(enforcer.run(changes_rx)),
        ];
        if let Some(sync) = &self.deps.sync {
            tasks.push(tokio::spawn(run_sync_schedule(
                Arc::clone(sync),
                Arc::clone(&self.deps.clock),
                token.child_token(),
            )));
        }

        tracing::info!(
            limits = limits.len(),
            tasks = tasks.len(),
            "monitoring started"
        );
        self.running = Some(Running { token, tasks });
        Ok(())
    }

    /// Cancels every task and waits for them to finish.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        running.token.cancel();
        for task in running.tasks {
            if let Err(err) = task.await {
                tracing::error!(error = %err, "monitoring task failed");
            }
        }
        self.state.send_replace(MonitoringState::default());
        tracing::info!("monitoring stopped");
    }
}

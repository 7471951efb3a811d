//! Limit enforcer.
//!
//! Reacts to foreground-changed signals. When the new app has an enabled
//! limit, a watch task checks today's usage on every tick and dispatches a
//! block once usage reaches the limit. At most one watch task is alive: the
//! previous one is cancelled and joined before the next is spawned.
//!
//! Limit lookups and usage checks read the database and run on the blocking
//! pool.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use wb_core::{AppLimit, Clock, LimitsSource, PackageName, UsagePipeline, format_limit};

use crate::state::StateSender;

/// A request to block an app that reached its limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRequest {
    pub package: PackageName,
    pub display_name: String,
    pub limit_ms: i64,
    /// `limit_ms` rendered for the block notice.
    pub limit_formatted: String,
}

impl BlockRequest {
    fn for_limit(limit: &AppLimit) -> Self {
        Self {
            package: limit.package.clone(),
            display_name: limit.display_name.clone(),
            limit_ms: limit.limit_ms,
            limit_formatted: format_limit(limit.limit_ms),
        }
    }
}

/// Performs the block effect, e.g. navigating home and showing an overlay.
pub trait BlockDispatcher: Send + Sync {
    fn dispatch(&self, request: &BlockRequest);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnforcerState {
    Inactive,
    Watching(PackageName),
}

struct WatchTask {
    app: PackageName,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Everything a watch task needs to check one app.
#[derive(Clone)]
struct UsageCheck {
    app: PackageName,
    pipeline: Arc<UsagePipeline>,
    limits: Arc<dyn LimitsSource>,
    dispatcher: Arc<dyn BlockDispatcher>,
    clock: Arc<dyn Clock>,
}

impl UsageCheck {
    fn run(&self) {
        // The limit may have been edited or disabled since the watch started.
        let limit = match find_limit(self.limits.as_ref(), &self.pipeline, &self.app) {
            Ok(Some(limit)) => limit,
            Ok(None) => {
                tracing::debug!(package = %self.app, "limit no longer enabled");
                return;
            }
            Err(err) => {
                tracing::warn!(package = %self.app, error = %err, "failed to read limit");
                return;
            }
        };
        let Some(window) = self.clock.today_so_far() else {
            tracing::warn!("no local midnight today, skipping usage check");
            return;
        };
        let usage_ms = match self.pipeline.app_usage(&self.app, window) {
            Ok(usage_ms) => usage_ms,
            Err(err) => {
                tracing::warn!(package = %self.app, error = %err, "usage check failed");
                return;
            }
        };

        tracing::debug!(
            package = %self.app,
            usage_ms,
            limit_ms = limit.limit_ms,
            "checked usage"
        );
        if limit.is_exceeded_by(usage_ms) {
            tracing::info!(
                package = %self.app,
                usage_ms,
                limit_ms = limit.limit_ms,
                "limit reached, dispatching block"
            );
            self.dispatcher.dispatch(&BlockRequest::for_limit(&limit));
        }
    }

    async fn watch(self, interval: Duration, token: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => break,
                // The first tick completes immediately.
                _ = ticker.tick() => {
                    let check = self.clone();
                    if let Err(err) = tokio::task::spawn_blocking(move || check.run()).await {
                        tracing::error!(
                            package = %self.app,
                            error = %err,
                            "usage check task failed"
                        );
                    }
                }
            }
        }
        tracing::debug!(package = %self.app, "watch stopped");
    }
}

/// The enabled limit whose package is, or merges into, the logical `app`.
fn find_limit(
    limits: &dyn LimitsSource,
    pipeline: &UsagePipeline,
    app: &PackageName,
) -> Result<Option<AppLimit>, wb_core::StoreError> {
    Ok(limits.enabled_limits()?.into_iter().find(|limit| {
        limit.enabled && (limit.package == *app || pipeline.logical_app(&limit.package) == *app)
    }))
}

pub struct LimitEnforcer {
    pipeline: Arc<UsagePipeline>,
    limits: Arc<dyn LimitsSource>,
    dispatcher: Arc<dyn BlockDispatcher>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    monitoring: Arc<StateSender>,
    token: CancellationToken,
    active: Option<WatchTask>,
}

impl LimitEnforcer {
    pub(crate) fn new(
        pipeline: Arc<UsagePipeline>,
        limits: Arc<dyn LimitsSource>,
        dispatcher: Arc<dyn BlockDispatcher>,
        clock: Arc<dyn Clock>,
        interval: Duration,
        monitoring: Arc<StateSender>,
        token: CancellationToken,
    ) -> Self {
        Self {
            pipeline,
            limits,
            dispatcher,
            clock,
            interval,
            monitoring,
            token,
            active: None,
        }
    }

    pub fn state(&self) -> EnforcerState {
        self.active
            .as_ref()
            .map_or(EnforcerState::Inactive, |task| {
                EnforcerState::Watching(task.app.clone())
            })
    }

    /// Stops any running watch and starts one for `app` if it has an enabled limit.
    pub async fn on_foreground_changed(&mut self, app: PackageName) {
        self.stop_watch().await;

        let lookup = {
            let limits = Arc::clone(&self.limits);
            let pipeline = Arc::clone(&self.pipeline);
            let app = app.clone();
            tokio::task::spawn_blocking(move || find_limit(limits.as_ref(), &pipeline, &app))
        };
        let limit = match lookup.await {
            Ok(Ok(Some(limit))) => limit,
            Ok(Ok(None)) => {
                tracing::debug!(package = %app, "no enabled limit");
                return;
            }
            Ok(Err(err)) => {
                tracing::error!(package = %app, error = %err, "failed to read limits");
                return;
            }
            Err(err) => {
                tracing::error!(package = %app, error = %err, "limit lookup task failed");
                return;
            }
        };

        tracing::info!(
            package = %app,
            limit_ms = limit.limit_ms,
            "watching app"
        );
        let check = UsageCheck {
            app: app.clone(),
            pipeline: Arc::clone(&self.pipeline),
            limits: Arc::clone(&self.limits),
            dispatcher: Arc::clone(&self.dispatcher),
            clock: Arc::clone(&self.clock),
        };
        let token = self.token.child_token();
        let handle = tokio::spawn(check.watch(self.interval, token.clone()));
        self.monitoring.send_modify(|state| {
            state.active_enforcer_app = Some(app.clone());
        });
        self.active = Some(WatchTask { app, token, handle });
    }

    async fn stop_watch(&mut self) {
        let Some(task) = self.active.take() else {
            return;
        };
        task.token.cancel();
        if let Err(err) = task.handle.await {
            tracing::error!(package = %task.app, error = %err, "watch task failed");
        }
        self.monitoring.send_modify(|state| {
            state.active_enforcer_app = None;
        });
    }

    /// Cancels and joins the running watch, if any.
    pub async fn shutdown(&mut self) {
        self.stop_watch().await;
    }

    /// Consumes foreground-changed signals until cancelled or the watcher hangs up.
    pub async fn run(mut self, mut changes: mpsc::Receiver<PackageName>) {
        let token = self.token.clone();
        loop {
            tokio::select! {
                () = token.cancelled() => break,
                change = changes.recv() => match change {
                    Some(app) => self.on_foreground_changed(app).await,
                    None => break,
                },
            }
        }
        self.shutdown().await;
        tracing::debug!("limit enforcer stopped");
    }
}

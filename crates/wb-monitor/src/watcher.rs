//! Foreground watcher.
//!
//! Samples a short trailing window on a fast interval and emits a
//! foreground-changed signal whenever the logical top-level app changes.
//! Event queries run on the blocking pool.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use wb_core::{Clock, PackageName, PipelineError, TimeWindow, UsagePipeline};

use crate::state::StateSender;

/// Watcher lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Idle,
    Sampling,
}

/// Timing and exclusions for the watcher.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub interval: Duration,
    /// Trailing window queried on each tick; covers the interval plus overlap.
    pub lookback: Duration,
    /// Foreground surfaces that never count as an app switch.
    pub system_surfaces: BTreeSet<PackageName>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1000),
            lookback: Duration::from_millis(2000),
            system_surfaces: ["com.android.systemui", "android"]
                .into_iter()
                .filter_map(|name| PackageName::new(name).ok())
                .collect(),
        }
    }
}

pub struct ForegroundWatcher {
    pipeline: Arc<UsagePipeline>,
    clock: Arc<dyn Clock>,
    config: WatcherConfig,
    monitoring: Arc<StateSender>,
    changes: mpsc::Sender<PackageName>,
    current: Option<PackageName>,
    state: WatcherState,
}

impl ForegroundWatcher {
    pub(crate) fn new(
        pipeline: Arc<UsagePipeline>,
        clock: Arc<dyn Clock>,
        config: WatcherConfig,
        monitoring: Arc<StateSender>,
        changes: mpsc::Sender<PackageName>,
    ) -> Self {
        Self {
            pipeline,
            clock,
            config,
            monitoring,
            changes,
            current: None,
            state: WatcherState::Idle,
        }
    }

    pub const fn state(&self) -> WatcherState {
        self.state
    }

    pub const fn current(&self) -> Option<&PackageName> {
        self.current.as_ref()
    }

    fn ignores(&self, app: &PackageName) -> bool {
        self.pipeline.filter().is_excluded(app) || self.config.system_surfaces.contains(app)
    }

    fn sample_window(&self) -> TimeWindow {
        let lookback_ms = i64::try_from(self.config.lookback.as_millis()).unwrap_or(i64::MAX);
        TimeWindow::trailing(self.clock.now(), lookback_ms)
    }

    /// One sampling pass on the calling thread. Returns the new foreground app
    /// when it changed.
    pub fn sample(&mut self) -> Option<PackageName> {
        let detected = detect(&self.pipeline, self.sample_window(), self.current.as_ref())?;
        self.observe(detected)
    }

    /// Like [`Self::sample`], with the event query on the blocking pool.
    async fn sample_blocking(&mut self) -> Option<PackageName> {
        let pipeline = Arc::clone(&self.pipeline);
        let window = self.sample_window();
        let previous = self.current.clone();
        let query =
            tokio::task::spawn_blocking(move || detect(&pipeline, window, previous.as_ref()));
        match query.await {
            Ok(detected) => self.observe(detected?),
            Err(err) => {
                tracing::error!(error = %err, "foreground query task failed");
                None
            }
        }
    }

    fn observe(&mut self, detected: PackageName) -> Option<PackageName> {
        if self.current.as_ref() == Some(&detected) {
            return None;
        }
        if self.ignores(&detected) {
            tracing::debug!(package = %detected, "ignoring foreground surface");
            return None;
        }

        tracing::info!(
            package = %detected,
            previous = ?self.current.as_ref().map(PackageName::as_str),
            "foreground changed"
        );
        self.current = Some(detected.clone());
        self.monitoring.send_modify(|state| {
            state.current_foreground_app = Some(detected.clone());
        });
        Some(detected)
    }

    /// Samples until `token` is cancelled or the enforcer hangs up.
    pub async fn run(mut self, token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.state = WatcherState::Sampling;
        tracing::debug!(interval = ?self.config.interval, "foreground watcher started");

        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => break,
                _ = ticker.tick() => {
                    let Some(app) = self.sample_blocking().await else {
                        continue;
                    };
                    if self.changes.send(app).await.is_err() {
                        tracing::debug!("enforcer gone, stopping watcher");
                        break;
                    }
                }
            }
        }

        self.state = WatcherState::Idle;
        tracing::debug!("foreground watcher stopped");
    }
}

/// The logical foreground app in `window`; query failures count as no change.
fn detect(
    pipeline: &UsagePipeline,
    window: TimeWindow,
    previous: Option<&PackageName>,
) -> Option<PackageName> {
    match pipeline.foreground_app(window, previous) {
        Ok(detected) => detected,
        Err(PipelineError::PermissionDenied) => {
            tracing::debug!("usage access revoked, skipping sample");
            None
        }
        Err(err) => {
            tracing::warn!(error = %err, "foreground query failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use tokio::sync::watch;
    use wb_core::{EventKind, ManualClock};

    use crate::state::MonitoringState;
    use crate::testing::{CUSTOM_TAB, Fixture, OwnerGroups, pkg};

    fn watcher(fixture: &Fixture) -> (ForegroundWatcher, mpsc::Receiver<PackageName>) {
        watcher_with(fixture, fixture.pipeline())
    }

    fn watcher_with(
        fixture: &Fixture,
        pipeline: Arc<UsagePipeline>,
    ) -> (ForegroundWatcher, mpsc::Receiver<PackageName>) {
        let (tx, rx) = mpsc::channel(8);
        let (state, _) = watch::channel(MonitoringState::default());
        let watcher = ForegroundWatcher::new(
            pipeline,
            fixture.clock.clone(),
            WatcherConfig::default(),
            Arc::new(state),
            tx,
        );
        (watcher, rx)
    }

    #[test]
    fn reports_change_once() {
        let fixture = Fixture::new();
        fixture.push("com.a", EventKind::Resumed, -500);
        let (mut watcher, _rx) = watcher(&fixture);

        assert_eq!(watcher.sample(), Some(pkg("com.a")));
        assert_eq!(watcher.sample(), None);
        assert_eq!(watcher.current(), Some(&pkg("com.a")));
    }

    #[test]
    fn ignores_self_and_system_surfaces() {
        let fixture = Fixture::new();
        fixture.push("com.a", EventKind::Resumed, -1500);
        let (mut watcher, _rx) = watcher(&fixture);
        assert_eq!(watcher.sample(), Some(pkg("com.a")));

        fixture.push("com.android.systemui", EventKind::Resumed, -800);
        assert_eq!(watcher.sample(), None);
        fixture.push("dev.self", EventKind::Resumed, -400);
        assert_eq!(watcher.sample(), None);
        assert_eq!(watcher.current(), Some(&pkg("com.a")));
    }

    #[test]
    fn old_events_fall_out_of_the_lookback() {
        let fixture = Fixture::new();
        fixture.push("com.a", EventKind::Resumed, -60_000);
        let (mut watcher, _rx) = watcher(&fixture);
        assert_eq!(watcher.sample(), None);
    }

    #[test]
    fn query_failure_is_absorbed() {
        let fixture = Fixture::new();
        fixture.push("com.a", EventKind::Resumed, -500);
        fixture.source.fail(true);
        let (mut watcher, _rx) = watcher(&fixture);
        assert_eq!(watcher.sample(), None);
        fixture.source.fail(false);
        assert_eq!(watcher.sample(), Some(pkg("com.a")));
    }

    #[test]
    fn custom_tab_after_lookback_stays_with_current_app() {
        let fixture = Fixture::new();
        fixture.push("com.news", EventKind::Resumed, -500);
        let (mut watcher, _rx) = watcher(&fixture);
        assert_eq!(watcher.sample(), Some(pkg("com.news")));

        fixture.clock.advance(ChronoDuration::milliseconds(60_000));
        fixture.push("com.news", EventKind::Paused, -500);
        fixture.push_view("com.android.chrome", CUSTOM_TAB, EventKind::Resumed, -500);
        assert_eq!(watcher.sample(), None);
        assert_eq!(watcher.current(), Some(&pkg("com.news")));
    }

    #[test]
    fn helper_in_foreground_reports_its_app() {
        let fixture = Fixture::new();
        fixture.push("com.vendor.helper", EventKind::Resumed, -800);
        let pipeline = fixture.pipeline_with(Arc::new(OwnerGroups));
        let (mut watcher, _rx) = watcher_with(&fixture, pipeline);
        assert_eq!(watcher.sample(), Some(pkg("com.vendor.app")));

        // Moving between members of one app is not a switch.
        fixture.push("com.vendor.app", EventKind::Resumed, -300);
        assert_eq!(watcher.sample(), None);
        assert_eq!(watcher.current(), Some(&pkg("com.vendor.app")));
    }

    #[tokio::test(start_paused = true)]
    async fn run_emits_signals_until_cancelled() {
        let fixture = Fixture::new();
        fixture.push("com.a", EventKind::Resumed, -500);
        let clock: Arc<ManualClock> = fixture.clock.clone();
        let (watcher, mut rx) = watcher(&fixture);
        let token = CancellationToken::new();
        let handle = tokio::spawn(watcher.run(token.clone()));

        assert_eq!(rx.recv().await, Some(pkg("com.a")));

        clock.advance(ChronoDuration::milliseconds(1000));
        fixture.push("com.b", EventKind::Resumed, -200);
        assert_eq!(rx.recv().await, Some(pkg("com.b")));

        token.cancel();
        handle.await.unwrap();
        assert_eq!(rx.recv().await, None);
    }
}

//! Historical usage sync and today's usage snapshot.
//!
//! The historical job fills every calendar day from the day after the last
//! synced day up to yesterday. Each day is written in one transaction, so a
//! failure leaves earlier days committed and later days untouched; the next
//! run picks up where this one stopped. A stop request is honored between
//! days the same way.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{Days, NaiveDate};
use thiserror::Error;

use crate::pipeline::{PipelineError, UsagePipeline};
use crate::source::{StoreError, UsageStore};
use crate::time::{Clock, days_inclusive};

/// Why a sync pass should be retried.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("no local midnight on {0}")]
    NoLocalMidnight(NaiveDate),
}

/// Result of one historical sync trigger.
#[derive(Debug)]
pub enum SyncOutcome {
    /// Nothing to sync.
    UpToDate,
    /// `days` days processed, `records` usage rows written.
    Synced { days: usize, records: usize },
    /// A transient failure; the job is idempotent, so retry later.
    Retry(SyncError),
    /// Another run was already in progress.
    Suppressed,
    /// Stopped on request after `days` days and `records` rows.
    Cancelled { days: usize, records: usize },
}

/// What happened to today's snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotOutcome {
    Replaced(usize),
    /// The query came back empty while stored usage exists; kept as is.
    Preserved,
}

/// Days to sync: `[last_synced + 1, yesterday]`, or the last `first_sync_days`
/// days ending yesterday when nothing was synced yet.
pub fn days_to_sync(
    last_synced: Option<NaiveDate>,
    today: NaiveDate,
    first_sync_days: u32,
) -> Vec<NaiveDate> {
    let Some(yesterday) = today.pred_opt() else {
        return Vec::new();
    };
    let first = match last_synced {
        Some(last) => match last.succ_opt() {
            Some(next) => next,
            None => return Vec::new(),
        },
        None => yesterday
            .checked_sub_days(Days::new(u64::from(first_sync_days.saturating_sub(1))))
            .unwrap_or(yesterday),
    };
    days_inclusive(first, yesterday)
}

/// Clears the in-progress flag when a run ends, however it ends.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Batch job persisting one usage set per completed day.
pub struct HistoricalSync {
    pipeline: Arc<UsagePipeline>,
    store: Arc<dyn UsageStore>,
    clock: Arc<dyn Clock>,
    first_sync_days: u32,
    snapshot_retention_days: u32,
    running: AtomicBool,
}

impl HistoricalSync {
    pub fn new(
        pipeline: Arc<UsagePipeline>,
        store: Arc<dyn UsageStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            pipeline,
            store,
            clock,
            first_sync_days: 7,
            snapshot_retention_days: 30,
            running: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub const fn with_first_sync_days(mut self, days: u32) -> Self {
        self.first_sync_days = days;
        self
    }

    #[must_use]
    pub const fn with_snapshot_retention_days(mut self, days: u32) -> Self {
        self.snapshot_retention_days = days;
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Runs one sync pass unless one is already in progress.
    pub fn trigger(&self) -> SyncOutcome {
        self.trigger_until(|| false)
    }

    /// Like [`Self::trigger`], checking `stop` before each day.
    pub fn trigger_until(&self, stop: impl Fn() -> bool) -> SyncOutcome {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("historical sync already running, suppressed");
            return SyncOutcome::Suppressed;
        }
        let _guard = RunGuard(&self.running);

        match self.sync_missing_days(&stop) {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!(error = %err, "historical sync failed, will retry");
                SyncOutcome::Retry(err)
            }
        }
    }

    fn sync_missing_days(&self, stop: &dyn Fn() -> bool) -> Result<SyncOutcome, SyncError> {
        if !self.pipeline.has_permission() {
            return Err(PipelineError::PermissionDenied.into());
        }
        let last_synced = self.store.last_sync_date()?;
        let days = days_to_sync(last_synced, self.clock.today(), self.first_sync_days);
        if days.is_empty() {
            tracing::debug!(?last_synced, "historical usage up to date");
            return Ok(SyncOutcome::UpToDate);
        }

        tracing::info!(
            first = %days[0],
            last = %days[days.len() - 1],
            "syncing historical usage"
        );
        let mut written = 0;
        for (done, day) in days.iter().enumerate() {
            if stop() {
                tracing::info!(
                    days = done,
                    remaining = days.len() - done,
                    "historical sync stopped"
                );
                return Ok(SyncOutcome::Cancelled {
                    days: done,
                    records: written,
                });
            }
            written += self.sync_day(*day)?;
        }
        Ok(SyncOutcome::Synced {
            days: days.len(),
            records: written,
        })
    }

    fn sync_day(&self, day: NaiveDate) -> Result<usize, SyncError> {
        let window = self
            .clock
            .day_window(day)
            .ok_or(SyncError::NoLocalMidnight(day))?;
        let records = self.pipeline.try_compute_usage(window)?;
        if records.is_empty() && self.store.day_usage_total(day)? > 0 {
            tracing::warn!(
                %day,
                "empty usage for a day with stored usage, keeping stored data"
            );
            return Ok(0);
        }
        let written = self.store.replace_day_usage(day, &records)?;
        tracing::info!(%day, records = written, "synced day");
        Ok(written)
    }

    /// Recomputes today's usage so far and replaces the stored snapshot.
    pub fn refresh_today(&self) -> Result<SnapshotOutcome, SyncError> {
        let today = self.clock.today();
        let window = self
            .clock
            .today_so_far()
            .ok_or(SyncError::NoLocalMidnight(today))?;
        let records = self.pipeline.try_compute_usage(window)?;
        if records.is_empty() && self.store.snapshot_total(today)? > 0 {
            tracing::warn!(
                %today,
                "usage query returned nothing but a snapshot exists, skipping update"
            );
            return Ok(SnapshotOutcome::Preserved);
        }
        let written = self.store.replace_snapshot(today, &records)?;
        Ok(SnapshotOutcome::Replaced(written))
    }

    /// Deletes snapshots older than the retention horizon.
    pub fn purge_snapshots(&self) -> Result<usize, SyncError> {
        let today = self.clock.today();
        let cutoff = today
            .checked_sub_days(Days::new(u64::from(self.snapshot_retention_days)))
            .unwrap_or(today);
        Ok(self.store.purge_snapshots_before(cutoff)?)
    }
}

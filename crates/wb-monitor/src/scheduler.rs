//! Historical sync scheduling: once at start, then at every local midnight.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use wb_core::{Clock, HistoricalSync, SyncOutcome};

/// Delay before retrying a pass that asked for a retry.
pub const RETRY_DELAY: Duration = Duration::from_secs(15 * 60);

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Time left until the next local midnight.
pub fn until_next_midnight(clock: &dyn Clock) -> Duration {
    clock
        .day_window(clock.today())
        .and_then(|window| (window.end - clock.now()).to_std().ok())
        .unwrap_or(DAY)
}

/// Runs one sync pass off the async threads and refreshes today's snapshot.
///
/// Cancelling `token` stops the pass before its next day.
pub async fn sync_once(
    sync: Arc<HistoricalSync>,
    token: CancellationToken,
) -> Option<SyncOutcome> {
    let result = tokio::task::spawn_blocking(move || {
        let outcome = sync.trigger_until(|| token.is_cancelled());
        if matches!(
            outcome,
            SyncOutcome::Suppressed | SyncOutcome::Cancelled { .. }
        ) {
            return outcome;
        }
        match sync.refresh_today() {
            Ok(snapshot) => tracing::debug!(?snapshot, "refreshed today's snapshot"),
            Err(err) => tracing::warn!(error = %err, "failed to refresh today's snapshot"),
        }
        match sync.purge_snapshots() {
            Ok(0) => {}
            Ok(purged) => tracing::debug!(purged, "purged old snapshots"),
            Err(err) => tracing::warn!(error = %err, "failed to purge snapshots"),
        }
        outcome
    })
    .await;

    match result {
        Ok(outcome) => {
            match &outcome {
                SyncOutcome::Synced { days, records } => {
                    tracing::info!(days, records, "historical sync finished");
                }
                SyncOutcome::UpToDate => tracing::debug!("historical usage up to date"),
                SyncOutcome::Retry(err) => {
                    tracing::warn!(error = %err, "historical sync will retry");
                }
                SyncOutcome::Suppressed => tracing::debug!("historical sync suppressed"),
                SyncOutcome::Cancelled { days, records } => {
                    tracing::info!(days, records, "historical sync cancelled");
                }
            }
            Some(outcome)
        }
        Err(err) => {
            tracing::error!(error = %err, "historical sync task panicked");
            None
        }
    }
}

/// Syncs now, then again after every local midnight, until cancelled.
pub async fn run_sync_schedule(
    sync: Arc<HistoricalSync>,
    clock: Arc<dyn Clock>,
    token: CancellationToken,
) {
    loop {
        let outcome = sync_once(Arc::clone(&sync), token.clone()).await;
        if token.is_cancelled() {
            break;
        }
        let until_midnight = until_next_midnight(clock.as_ref());
        let wait = if matches!(outcome, Some(SyncOutcome::Retry(_))) {
            until_midnight.min(RETRY_DELAY)
        } else {
            until_midnight
        };
        tracing::debug!(?wait, "next historical sync scheduled");

        tokio::select! {
            () = token.cancelled() => break,
            () = tokio::time::sleep(wait) => {}
        }
    }
    tracing::debug!("sync scheduler stopped");
}

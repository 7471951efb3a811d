//! Sync command: persist completed days and refresh today's snapshot.

use std::io::Write;

use anyhow::{Context, Result};

use wb_core::{HistoricalSync, SnapshotOutcome, SyncOutcome};

pub fn run<W: Write>(writer: &mut W, sync: &HistoricalSync) -> Result<()> {
    match sync.trigger() {
        SyncOutcome::Synced { days, records } => {
            writeln!(writer, "Synced {days} day(s), {records} usage row(s).")?;
        }
        SyncOutcome::UpToDate => writeln!(writer, "History up to date.")?,
        SyncOutcome::Suppressed => {
            writeln!(writer, "A sync is already running.")?;
            return Ok(());
        }
        SyncOutcome::Retry(err) => {
            return Err(
                anyhow::Error::new(err).context("historical sync failed, run it again later")
            );
        }
        SyncOutcome::Cancelled { days, records } => {
            writeln!(
                writer,
                "Sync stopped after {days} day(s), {records} usage row(s)."
            )?;
            return Ok(());
        }
    }

    match sync
        .refresh_today()
        .context("failed to refresh today's snapshot")?
    {
        SnapshotOutcome::Replaced(apps) => writeln!(writer, "Today so far: {apps} app(s).")?,
        SnapshotOutcome::Preserved => {
            writeln!(writer, "Today so far: kept stored snapshot.")?;
        }
    }

    let purged = sync
        .purge_snapshots()
        .context("failed to purge old snapshots")?;
    if purged > 0 {
        writeln!(writer, "Purged {purged} old snapshot row(s).")?;
    }
    Ok(())
}

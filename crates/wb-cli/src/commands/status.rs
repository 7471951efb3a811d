//! Status command for showing what the database holds.

use std::io::Write;
use std::path::Path;

use anyhow::Result;

use wb_db::Database;

pub fn run<W: Write>(writer: &mut W, db: &Database, database_path: &Path) -> Result<()> {
    let limits = db.list_limits()?;
    let enabled = limits.iter().filter(|limit| limit.enabled).count();
    let last_sync = db.last_sync_date()?;
    let events = db.count_events()?;

    writeln!(writer, "Wellbeing status")?;
    writeln!(writer, "Database: {}", database_path.display())?;
    writeln!(writer, "Limits: {} ({enabled} enabled)", limits.len())?;
    match last_sync {
        Some(day) => writeln!(writer, "Last synced day: {day}")?,
        None => writeln!(writer, "Last synced day: never")?,
    }
    if events == 0 {
        writeln!(writer, "No events recorded.")?;
    } else {
        writeln!(writer, "Recorded events: {events}")?;
    }

    Ok(())
}

//! Usage command: ranked per-app usage for one local day.

use std::fmt::Write as _;
use std::io::Write;

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;

use wb_core::{Clock, TimeWindow, UsagePipeline, UsageRecord, format_usage};

/// The window for `date`, or today so far when `date` is today or absent.
pub fn window_for(clock: &dyn Clock, date: Option<NaiveDate>) -> Result<(NaiveDate, TimeWindow)> {
    let today = clock.today();
    let day = date.unwrap_or(today);
    let window = if day == today {
        clock.today_so_far()
    } else {
        clock.day_window(day)
    };
    let window = window.ok_or_else(|| anyhow!("{day} has no local midnight"))?;
    Ok((day, window))
}

pub fn run<W: Write>(
    writer: &mut W,
    pipeline: &UsagePipeline,
    clock: &dyn Clock,
    date: Option<NaiveDate>,
    json: bool,
) -> Result<()> {
    let (day, window) = window_for(clock, date)?;
    let records = pipeline
        .try_compute_usage(window)
        .with_context(|| format!("failed to compute usage for {day}"))?;

    if json {
        let json = serde_json::to_string_pretty(&records).context("failed to encode usage")?;
        writeln!(writer, "{json}")?;
    } else {
        write!(writer, "{}", format_usage_table(day, &records))?;
    }
    Ok(())
}

fn format_usage_table(day: NaiveDate, records: &[UsageRecord]) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "Usage for {day}");
    if records.is_empty() {
        let _ = writeln!(output, "No usage recorded.");
        return output;
    }

    let width = records
        .iter()
        .map(|record| record.app.display_name.chars().count())
        .max()
        .unwrap_or(0);
    for record in records {
        let _ = writeln!(
            output,
            "  {:<width$}  {:>7}  {}",
            record.app.display_name,
            format_usage(record.duration_ms),
            record.app.key,
        );
    }
    let total: i64 = records.iter().map(|record| record.duration_ms).sum();
    let _ = writeln!(output, "Total: {}", format_usage(total));
    output
}

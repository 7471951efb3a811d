//! Limits command for managing per-app daily budgets.

use std::io::Write;

use anyhow::{Context, Result};

use wb_core::{AppLimit, PackageName, format_limit};
use wb_db::Database;

const MINUTE_MS: i64 = 60 * 1000;

pub fn list<W: Write>(writer: &mut W, db: &Database) -> Result<()> {
    let limits = db.list_limits().context("failed to list limits")?;
    if limits.is_empty() {
        writeln!(writer, "No limits configured.")?;
        return Ok(());
    }

    writeln!(writer, "Daily limits")?;
    let width = limits
        .iter()
        .map(|limit| limit.display_name.chars().count())
        .max()
        .unwrap_or(0);
    for limit in &limits {
        let state = if limit.enabled { "enabled" } else { "disabled" };
        writeln!(
            writer,
            "  {:<width$}  {:>7}  {state:<8}  {}",
            limit.display_name,
            format_limit(limit.limit_ms),
            limit.package,
        )?;
    }
    Ok(())
}

/// Sets (or replaces) the budget for `package`, re-enabling it.
///
/// The display name falls back to the imported package label, then to the
/// package identifier itself.
pub fn set<W: Write>(
    writer: &mut W,
    db: &mut Database,
    package: &str,
    minutes: u32,
    name: Option<&str>,
) -> Result<()> {
    let package = PackageName::new(package).context("invalid package")?;
    let display_name = match name.map(str::trim).filter(|name| !name.is_empty()) {
        Some(name) => name.to_string(),
        None => db
            .package_info(&package)
            .context("failed to look up package")?
            .map_or_else(|| package.to_string(), |info| info.display_name),
    };
    let limit = AppLimit::new(package, display_name, i64::from(minutes) * MINUTE_MS)
        .context("invalid limit")?;
    db.upsert_limit(&limit)
        .with_context(|| format!("failed to store limit for {}", limit.package))?;

    tracing::info!(package = %limit.package, limit_ms = limit.limit_ms, "limit set");
    writeln!(
        writer,
        "Limit for {} ({}) set to {}.",
        limit.display_name,
        limit.package,
        format_limit(limit.limit_ms)
    )?;
    Ok(())
}

pub fn remove<W: Write>(writer: &mut W, db: &mut Database, package: &str) -> Result<()> {
    let package = PackageName::new(package).context("invalid package")?;
    if db
        .delete_limit(&package)
        .with_context(|| format!("failed to remove limit for {package}"))?
    {
        writeln!(writer, "Removed limit for {package}.")?;
    } else {
        writeln!(writer, "No limit configured for {package}.")?;
    }
    Ok(())
}

pub fn disable<W: Write>(writer: &mut W, db: &mut Database, package: &str) -> Result<()> {
    let package = PackageName::new(package).context("invalid package")?;
    if db
        .set_limit_enabled(&package, false)
        .with_context(|| format!("failed to disable limit for {package}"))?
    {
        writeln!(writer, "Disabled limit for {package}.")?;
    } else {
        writeln!(writer, "No limit configured for {package}.")?;
    }
    Ok(())
}

//! Import command for loading app-switch events and package metadata.
//!
//! Reads JSON lines from stdin. Each line is either an event:
//!
//! ```json
//! {"type":"event","timestamp":"2025-01-15T09:00:00Z","package":"com.app","kind":"resumed"}
//! ```
//!
//! or a package record:
//!
//! ```json
//! {"type":"package","package":"com.app","display_name":"App","owner_group":10001}
//! ```

use std::io::{self, BufRead};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use wb_core::{EventKind, PackageInfo, PackageName, RawEvent, RawIdentity};
use wb_db::{Database, EventRecord};

/// Rows written by one import.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub events: usize,
    pub packages: usize,
}

pub fn run(db: &mut Database) -> Result<ImportSummary> {
    let stdin = io::stdin();
    let parsed = parse_lines(stdin.lock())?;
    store(db, parsed)
}

#[derive(Debug, Default)]
struct Parsed {
    events: Vec<EventRecord>,
    packages: Vec<(PackageName, PackageInfo)>,
}

fn store(db: &mut Database, parsed: Parsed) -> Result<ImportSummary> {
    for (package, info) in &parsed.packages {
        db.upsert_package(package, info)
            .with_context(|| format!("failed to store package {package}"))?;
    }
    let events = db
        .insert_events(&parsed.events)
        .context("failed to store events")?;
    Ok(ImportSummary {
        events,
        packages: parsed.packages.len(),
    })
}

fn parse_lines<R: BufRead>(reader: R) -> Result<Parsed> {
    let mut parsed = Parsed::default();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read line {}", idx + 1))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let entry: ImportLine = serde_json::from_str(trimmed)
            .with_context(|| format!("invalid JSON on line {}", idx + 1))?;
        match entry {
            ImportLine::Event(event) => {
                let record = event
                    .into_record()
                    .with_context(|| format!("invalid event on line {}", idx + 1))?;
                parsed.events.push(record);
            }
            ImportLine::Package(package) => {
                let entry = package
                    .into_entry()
                    .with_context(|| format!("invalid package on line {}", idx + 1))?;
                parsed.packages.push(entry);
            }
        }
    }
    Ok(parsed)
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ImportLine {
    Event(ImportEvent),
    Package(ImportPackage),
}

#[derive(Debug, Deserialize)]
struct ImportEvent {
    #[serde(default)]
    id: Option<String>,
    timestamp: DateTime<Utc>,
    package: String,
    #[serde(default)]
    view: Option<String>,
    kind: String,
}

impl ImportEvent {
    fn into_record(self) -> Result<EventRecord> {
        let package = PackageName::new(self.package)?;
        let kind: EventKind = self.kind.parse()?;
        let view = self.view.filter(|view| !view.trim().is_empty());
        let event = RawEvent::new(RawIdentity::new(package, view), kind, self.timestamp);
        Ok(match self.id {
            Some(id) if !id.trim().is_empty() => EventRecord { id, event },
            _ => EventRecord::from_event(event),
        })
    }
}

const fn default_launchable() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct ImportPackage {
    package: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    owner_group: Option<i64>,
    #[serde(default = "default_launchable")]
    launchable: bool,
    #[serde(default)]
    system: bool,
    #[serde(default)]
    updated_system: bool,
}

impl ImportPackage {
    fn into_entry(self) -> Result<(PackageName, PackageInfo)> {
        let package = PackageName::new(self.package)?;
        let display_name = self
            .display_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| package.to_string());
        Ok((
            package,
            PackageInfo {
                display_name,
                owner_group: self.owner_group,
                launchable: self.launchable,
                system: self.system,
                updated_system: self.updated_system,
            },
        ))
    }
}

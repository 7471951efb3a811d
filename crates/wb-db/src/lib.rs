//! Storage layer for the wellbeing engine.
//!
//! Provides persistence for app limits, recorded app-switch events, package
//! metadata, historical per-day usage and today's usage snapshot using
//! `rusqlite`.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! A `Database` instance can be moved between threads but cannot be shared
//! across threads without external synchronization. [`SharedDatabase`] wraps it
//! in an `Arc<Mutex<_>>` and implements the `wb-core` collaborator traits, so
//! the pipeline and the monitoring tasks can share one connection.
//!
//! # Schema
//!
//! ## Timestamp Format
//!
//! Timestamps are stored as TEXT in RFC 3339 format with millisecond precision
//! (e.g., `2024-01-15T10:30:00.000Z`), so lexicographic ordering matches
//! chronological ordering. Days are stored as `YYYY-MM-DD`.
//!
//! ## Usage Tables
//!
//! `historical_usage` holds one row per `(package, day)` for completed days;
//! `lastSyncDate` is `MAX(day)` of that table. `daily_usage` has the same
//! shape and holds the rolling snapshot of days still in progress.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use wb_core::{
    AppLimit, EventKind, EventSource, LimitsSource, OwnerGroupId, PackageCatalog, PackageInfo,
    PackageName, RawEvent, RawIdentity, SourceError, StoreError, TimeWindow, UsageRecord,
    UsageStore, ValidationError,
};

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Failed to parse a stored timestamp.
    #[error("invalid timestamp in {table}: {timestamp}")]
    TimestampParse {
        table: &'static str,
        timestamp: String,
        #[source]
        source: chrono::ParseError,
    },
    /// Failed to parse a stored day.
    #[error("invalid day in {table}: {day}")]
    InvalidDate {
        table: &'static str,
        day: String,
        #[source]
        source: chrono::ParseError,
    },
    /// A stored value no longer passes domain validation.
    #[error("invalid stored value: {0}")]
    Validation(#[from] ValidationError),
    /// A thread panicked while holding the shared connection.
    #[error("database lock poisoned")]
    Poisoned,
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

/// A recorded app-switch event with its dedupe key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: String,
    #[serde(flatten)]
    pub event: RawEvent,
}

impl EventRecord {
    /// Wraps `event` with an id derived from its content.
    pub fn from_event(event: RawEvent) -> Self {
        let id = format!(
            "{}|{}|{}",
            format_timestamp(event.timestamp),
            event.identity,
            event.kind
        );
        Self { id, event }
    }
}

/// A persisted per-day usage row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredUsage {
    pub package: PackageName,
    pub day: NaiveDate,
    pub display_name: String,
    pub total_usage_ms: i64,
    pub last_used_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
enum UsageTable {
    Historical,
    Snapshot,
}

impl UsageTable {
    const fn name(self) -> &'static str {
        match self {
            Self::Historical => "historical_usage",
            Self::Snapshot => "daily_usage",
        }
    }
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS app_limits (
                package TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                limit_ms INTEGER NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS historical_usage (
                package TEXT NOT NULL,
                day TEXT NOT NULL,
                display_name TEXT NOT NULL,
                total_usage_ms INTEGER NOT NULL,
                last_used_at TEXT NOT NULL,
                last_updated TEXT NOT NULL,
                PRIMARY KEY (package, day)
            );

            CREATE INDEX IF NOT EXISTS idx_historical_usage_day ON historical_usage(day);

            -- Snapshot of days still in progress, replaced wholesale per day
            CREATE TABLE IF NOT EXISTS daily_usage (
                package TEXT NOT NULL,
                day TEXT NOT NULL,
                display_name TEXT NOT NULL,
                total_usage_ms INTEGER NOT NULL,
                last_used_at TEXT NOT NULL,
                last_updated TEXT NOT NULL,
                PRIMARY KEY (package, day)
            );

            CREATE INDEX IF NOT EXISTS idx_daily_usage_day ON daily_usage(day);

            -- Recorded app-switch events
            -- kind: 'resumed' or 'paused'
            -- view: class qualifier of the screen, if reported
            CREATE TABLE IF NOT EXISTS usage_events (
                id TEXT PRIMARY KEY,
                timestamp TEXT NOT NULL,
                package TEXT NOT NULL,
                view TEXT,
                kind TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_usage_events_timestamp ON usage_events(timestamp);

            CREATE TABLE IF NOT EXISTS packages (
                package TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                owner_group INTEGER,
                launchable INTEGER NOT NULL DEFAULT 1,
                system INTEGER NOT NULL DEFAULT 0,
                updated_system INTEGER NOT NULL DEFAULT 0
            );
            ",
        )?;
        Ok(())
    }

    /// Inserts or replaces the limit for `limit.package`.
    pub fn upsert_limit(&mut self, limit: &AppLimit) -> Result<(), DbError> {
        self.conn.execute(
            "
            INSERT INTO app_limits (package, display_name, limit_ms, enabled)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(package) DO UPDATE SET
                display_name = excluded.display_name,
                limit_ms = excluded.limit_ms,
                enabled = excluded.enabled
            ",
            params![
                limit.package.as_str(),
                limit.display_name,
                limit.limit_ms,
                limit.enabled
            ],
        )?;
        Ok(())
    }

    /// Deletes the limit for `package`. Returns whether a row was removed.
    pub fn delete_limit(&mut self, package: &PackageName) -> Result<bool, DbError> {
        let removed = self.conn.execute(
            "DELETE FROM app_limits WHERE package = ?",
            [package.as_str()],
        )?;
        Ok(removed > 0)
    }

    /// Enables or disables the limit for `package`. Returns whether it exists.
    pub fn set_limit_enabled(
        &mut self,
        package: &PackageName,
        enabled: bool,
    ) -> Result<bool, DbError> {
        let updated = self.conn.execute(
            "UPDATE app_limits SET enabled = ? WHERE package = ?",
            params![enabled, package.as_str()],
        )?;
        Ok(updated > 0)
    }

    /// Lists all limits ordered by package.
    pub fn list_limits(&self) -> Result<Vec<AppLimit>, DbError> {
        self.query_limits(
            "SELECT package, display_name, limit_ms, enabled FROM app_limits ORDER BY package ASC",
        )
    }

    /// Lists enabled limits ordered by package.
    pub fn enabled_limits(&self) -> Result<Vec<AppLimit>, DbError> {
        self.query_limits(
            "
            SELECT package, display_name, limit_ms, enabled
            FROM app_limits
            WHERE enabled = 1
            ORDER BY package ASC
            ",
        )
    }

    /// The limit configured for `package`, enabled or not.
    pub fn limit_for(&self, package: &PackageName) -> Result<Option<AppLimit>, DbError> {
        let row = self
            .conn
            .query_row(
                "SELECT package, display_name, limit_ms, enabled FROM app_limits WHERE package = ?",
                [package.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, bool>(3)?,
                    ))
                },
            )
            .optional()?;
        row.map(limit_from_row).transpose()
    }

    fn query_limits(&self, sql: &str) -> Result<Vec<AppLimit>, DbError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, bool>(3)?,
            ))
        })?;
        let mut limits = Vec::new();
        for row in rows {
            limits.push(limit_from_row(row?)?);
        }
        Ok(limits)
    }

    /// Inserts a batch of events, ignoring duplicates by ID.
    pub fn insert_events(&mut self, events: &[EventRecord]) -> Result<usize, DbError> {
        if events.is_empty() {
            return Ok(0);
        }
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "
                INSERT OR IGNORE INTO usage_events (id, timestamp, package, view, kind)
                VALUES (?, ?, ?, ?, ?)
                ",
            )?;
            for record in events {
                let event = &record.event;
                inserted += stmt.execute(params![
                    record.id,
                    format_timestamp(event.timestamp),
                    event.identity.package.as_str(),
                    event.identity.view,
                    event.kind.as_str(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Number of recorded events.
    pub fn count_events(&self) -> Result<i64, DbError> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM usage_events", [], |row| row.get(0))?)
    }

    /// Lists events within a time range, ordered by timestamp then ID.
    ///
    /// The range is inclusive of `start` and exclusive of `end`.
    pub fn events_in_range(&self, window: TimeWindow) -> Result<Vec<RawEvent>, DbError> {
        if window.is_empty() {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn.prepare(
            "
            SELECT timestamp, package, view, kind
            FROM usage_events
            WHERE timestamp >= ? AND timestamp < ?
            ORDER BY timestamp ASC, id ASC
            ",
        )?;
        let rows = stmt.query_map(
            [format_timestamp(window.start), format_timestamp(window.end)],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        )?;
        let mut events = Vec::new();
        for row in rows {
            let (timestamp, package, view, kind) = row?;
            let kind: EventKind = kind.parse()?;
            events.push(RawEvent::new(
                RawIdentity::new(PackageName::new(package)?, view),
                kind,
                parse_timestamp(&timestamp, "usage_events")?,
            ));
        }
        Ok(events)
    }

    /// Inserts or replaces catalog metadata for `package`.
    pub fn upsert_package(
        &mut self,
        package: &PackageName,
        info: &PackageInfo,
    ) -> Result<(), DbError> {
        self.conn.execute(
            "
            INSERT INTO packages
                (package, display_name, owner_group, launchable, system, updated_system)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(package) DO UPDATE SET
                display_name = excluded.display_name,
                owner_group = excluded.owner_group,
                launchable = excluded.launchable,
                system = excluded.system,
                updated_system = excluded.updated_system
            ",
            params![
                package.as_str(),
                info.display_name,
                info.owner_group,
                info.launchable,
                info.system,
                info.updated_system,
            ],
        )?;
        Ok(())
    }

    /// Catalog metadata for `package`, if known.
    pub fn package_info(&self, package: &PackageName) -> Result<Option<PackageInfo>, DbError> {
        Ok(self
            .conn
            .query_row(
                "
                SELECT display_name, owner_group, launchable, system, updated_system
                FROM packages
                WHERE package = ?
                ",
                [package.as_str()],
                |row| {
                    Ok(PackageInfo {
                        display_name: row.get(0)?,
                        owner_group: row.get(1)?,
                        launchable: row.get(2)?,
                        system: row.get(3)?,
                        updated_system: row.get(4)?,
                    })
                },
            )
            .optional()?)
    }

    /// Catalog packages sharing `group`, in key order.
    pub fn owner_group_members(&self, group: OwnerGroupId) -> Result<Vec<PackageName>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT package FROM packages WHERE owner_group = ? ORDER BY package")?;
        let rows = stmt.query_map([group], |row| row.get::<_, String>(0))?;
        let mut members = Vec::new();
        for row in rows {
            members.push(PackageName::new(row?)?);
        }
        Ok(members)
    }

    /// Replaces historical usage for `day` wholesale in one transaction.
    pub fn replace_day_usage(
        &mut self,
        day: NaiveDate,
        records: &[UsageRecord],
    ) -> Result<usize, DbError> {
        self.replace_usage(UsageTable::Historical, day, records)
    }

    fn replace_usage(
        &mut self,
        table: UsageTable,
        day: NaiveDate,
        records: &[UsageRecord],
    ) -> Result<usize, DbError> {
        let tx = self.conn.transaction()?;
        tx.execute(
            &format!("DELETE FROM {} WHERE day = ?", table.name()),
            [day.to_string()],
        )?;
        let written = upsert_usage(&tx, table, day, records, Utc::now())?;
        tx.commit()?;
        Ok(written)
    }

    /// Historical usage for `day`, highest usage first.
    pub fn historical_usage_for_day(&self, day: NaiveDate) -> Result<Vec<StoredUsage>, DbError> {
        self.usage_for_day(UsageTable::Historical, day)
    }

    /// The latest day present in historical usage.
    pub fn last_sync_date(&self) -> Result<Option<NaiveDate>, DbError> {
        let day: Option<String> =
            self.conn
                .query_row("SELECT MAX(day) FROM historical_usage", [], |row| row.get(0))?;
        day.map(|day| parse_day(&day, "historical_usage")).transpose()
    }

    /// Replaces the snapshot for `day` wholesale in one transaction.
    pub fn replace_snapshot(
        &mut self,
        day: NaiveDate,
        records: &[UsageRecord],
    ) -> Result<usize, DbError> {
        self.replace_usage(UsageTable::Snapshot, day, records)
    }

    /// Snapshot rows for `day`, highest usage first.
    pub fn snapshot_for_day(&self, day: NaiveDate) -> Result<Vec<StoredUsage>, DbError> {
        self.usage_for_day(UsageTable::Snapshot, day)
    }

    /// Deletes snapshot rows for days before `day`.
    pub fn purge_snapshots_before(&mut self, day: NaiveDate) -> Result<usize, DbError> {
        Ok(self
            .conn
            .execute("DELETE FROM daily_usage WHERE day < ?", [day.to_string()])?)
    }

    fn usage_total(&self, table: UsageTable, day: NaiveDate) -> Result<i64, DbError> {
        let sql = format!(
            "SELECT COALESCE(SUM(total_usage_ms), 0) FROM {} WHERE day = ?",
            table.name()
        );
        Ok(self
            .conn
            .query_row(&sql, [day.to_string()], |row| row.get(0))?)
    }

    fn usage_for_day(
        &self,
        table: UsageTable,
        day: NaiveDate,
    ) -> Result<Vec<StoredUsage>, DbError> {
        let sql = format!(
            "
            SELECT package, display_name, total_usage_ms, last_used_at, last_updated
            FROM {}
            WHERE day = ?
            ORDER BY total_usage_ms DESC, package ASC
            ",
            table.name()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([day.to_string()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;
        let mut usage = Vec::new();
        for row in rows {
            let (package, display_name, total_usage_ms, last_used_at, last_updated) = row?;
            usage.push(StoredUsage {
                package: PackageName::new(package)?,
                day,
                display_name,
                total_usage_ms,
                last_used_at: parse_timestamp(&last_used_at, table.name())?,
                last_updated: parse_timestamp(&last_updated, table.name())?,
            });
        }
        Ok(usage)
    }
}

fn upsert_usage(
    tx: &Transaction<'_>,
    table: UsageTable,
    day: NaiveDate,
    records: &[UsageRecord],
    now: DateTime<Utc>,
) -> Result<usize, DbError> {
    let sql = format!(
        "
        INSERT INTO {} (package, day, display_name, total_usage_ms, last_used_at, last_updated)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(package, day) DO UPDATE SET
            display_name = excluded.display_name,
            total_usage_ms = excluded.total_usage_ms,
            last_used_at = excluded.last_used_at,
            last_updated = excluded.last_updated
        ",
        table.name()
    );
    let mut stmt = tx.prepare(&sql)?;
    let day = day.to_string();
    let updated = format_timestamp(now);
    let mut written = 0;
    for record in records {
        written += stmt.execute(params![
            record.app.key.as_str(),
            day,
            record.app.display_name,
            record.duration_ms,
            format_timestamp(record.last_used_at),
            updated,
        ])?;
    }
    Ok(written)
}

fn limit_from_row(
    (package, display_name, limit_ms, enabled): (String, String, i64, bool),
) -> Result<AppLimit, DbError> {
    let mut limit = AppLimit::new(PackageName::new(package)?, display_name, limit_ms)?;
    limit.enabled = enabled;
    Ok(limit)
}

fn parse_timestamp(timestamp: &str, table: &'static str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| DbError::TimestampParse {
            table,
            timestamp: timestamp.to_string(),
            source,
        })
}

fn parse_day(day: &str, table: &'static str) -> Result<NaiveDate, DbError> {
    NaiveDate::parse_from_str(day, "%Y-%m-%d").map_err(|source| DbError::InvalidDate {
        table,
        day: day.to_string(),
        source,
    })
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// A [`Database`] shared across tasks.
///
/// Implements the `wb-core` collaborator traits over the recorded event log,
/// the package table, the limits table and the usage tables.
#[derive(Clone)]
pub struct SharedDatabase {
    inner: Arc<Mutex<Database>>,
}

impl SharedDatabase {
    pub fn new(db: Database) -> Self {
        Self {
            inner: Arc::new(Mutex::new(db)),
        }
    }

    /// Locks the connection for direct use.
    pub fn lock(&self) -> Result<MutexGuard<'_, Database>, DbError> {
        self.inner.lock().map_err(|_| DbError::Poisoned)
    }
}

impl EventSource for SharedDatabase {
    fn query_events(&self, window: TimeWindow) -> Result<Vec<RawEvent>, SourceError> {
        self.lock()
            .and_then(|db| db.events_in_range(window))
            .map_err(SourceError::new)
    }
}

impl PackageCatalog for SharedDatabase {
    fn package_info(&self, package: &PackageName) -> Option<PackageInfo> {
        match self.lock().and_then(|db| db.package_info(package)) {
            Ok(info) => info,
            Err(err) => {
                tracing::warn!(%package, error = %err, "package lookup failed");
                None
            }
        }
    }

    fn owner_group_members(&self, group: OwnerGroupId) -> Vec<PackageName> {
        match self.lock().and_then(|db| db.owner_group_members(group)) {
            Ok(members) => members,
            Err(err) => {
                tracing::warn!(owner_group = group, error = %err, "owner group lookup failed");
                Vec::new()
            }
        }
    }
}

impl LimitsSource for SharedDatabase {
    fn enabled_limits(&self) -> Result<Vec<AppLimit>, StoreError> {
        self.lock()
            .and_then(|db| db.enabled_limits())
            .map_err(StoreError::new)
    }
}

impl UsageStore for SharedDatabase {
    fn last_sync_date(&self) -> Result<Option<NaiveDate>, StoreError> {
        self.lock()
            .and_then(|db| db.last_sync_date())
            .map_err(StoreError::new)
    }

    fn day_usage_total(&self, day: NaiveDate) -> Result<i64, StoreError> {
        self.lock()
            .and_then(|db| db.usage_total(UsageTable::Historical, day))
            .map_err(StoreError::new)
    }

    fn replace_day_usage(
        &self,
        day: NaiveDate,
        records: &[UsageRecord],
    ) -> Result<usize, StoreError> {
        self.lock()
            .and_then(|mut db| db.replace_day_usage(day, records))
            .map_err(StoreError::new)
    }

    fn snapshot_total(&self, day: NaiveDate) -> Result<i64, StoreError> {
        self.lock()
            .and_then(|db| db.usage_total(UsageTable::Snapshot, day))
            .map_err(StoreError::new)
    }

    fn replace_snapshot(
        &self,
        day: NaiveDate,
        records: &[UsageRecord],
    ) -> Result<usize, StoreError> {
        self.lock()
            .and_then(|mut db| db.replace_snapshot(day, records))
            .map_err(StoreError::new)
    }

    fn purge_snapshots_before(&self, day: NaiveDate) -> Result<usize, StoreError> {
        self.lock()
            .and_then(|mut db| db.purge_snapshots_before(day))
            .map_err(StoreError::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use chrono::{Duration, TimeZone};
    use wb_core::{LogicalApp, PipelineConfig, StaticPermission, UsagePipeline};

    fn pkg(name: &str) -> PackageName {
        PackageName::new(name).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn ts(ms: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 9, 0, 0).unwrap() + Duration::milliseconds(ms)
    }

    fn event(name: &str, kind: EventKind, ms: i64) -> EventRecord {
        EventRecord::from_event(RawEvent::new(RawIdentity::package(pkg(name)), kind, ts(ms)))
    }

    fn record(name: &str, duration_ms: i64) -> UsageRecord {
        UsageRecord {
            app: LogicalApp {
                key: pkg(name),
                display_name: name.to_uppercase(),
                owner_group: None,
            },
            window_start: ts(0),
            window_end: ts(86_400_000),
            duration_ms,
            last_used_at: ts(duration_ms),
            members: vec![pkg(name)],
        }
    }

    fn table_columns(conn: &Connection, table: &str) -> Vec<String> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({table})"))
            .expect("prepare table_info");
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .expect("query table_info");
        rows.map(|row| row.expect("table_info row")).collect()
    }

    fn index_names(conn: &Connection, table: &str) -> HashSet<String> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA index_list({table})"))
            .expect("prepare index_list");
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .expect("query index_list");
        rows.map(|row| row.expect("index_list row")).collect()
    }

    #[test]
    fn open_in_memory_database() {
        let db = Database::open_in_memory();
        assert!(db.is_ok());
    }

    #[test]
    fn schema_matches_data_model() {
        let db = Database::open_in_memory().expect("open in-memory db");

        assert_eq!(
            table_columns(&db.conn, "app_limits"),
            vec!["package", "display_name", "limit_ms", "enabled"]
        );
        let usage_columns = vec![
            "package",
            "day",
            "display_name",
            "total_usage_ms",
            "last_used_at",
            "last_updated",
        ];
        assert_eq!(table_columns(&db.conn, "historical_usage"), usage_columns);
        assert_eq!(table_columns(&db.conn, "daily_usage"), usage_columns);
        assert_eq!(
            table_columns(&db.conn, "usage_events"),
            vec!["id", "timestamp", "package", "view", "kind"]
        );
        assert_eq!(
            table_columns(&db.conn, "packages"),
            vec![
                "package",
                "display_name",
                "owner_group",
                "launchable",
                "system",
                "updated_system",
            ]
        );

        assert!(index_names(&db.conn, "usage_events").contains("idx_usage_events_timestamp"));
        assert!(index_names(&db.conn, "historical_usage").contains("idx_historical_usage_day"));
    }

    #[test]
    fn reopening_file_database_keeps_data() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("wb.db");
        {
            let mut db = Database::open(&path).unwrap();
            db.upsert_limit(&AppLimit::new(pkg("com.a"), "A", 60_000).unwrap())
                .unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.list_limits().unwrap().len(), 1);
    }

    #[test]
    fn limits_round_through_upsert_disable_and_delete() {
        let mut db = Database::open_in_memory().unwrap();
        db.upsert_limit(&AppLimit::new(pkg("com.b"), "B", 60_000).unwrap())
            .unwrap();
        db.upsert_limit(&AppLimit::new(pkg("com.a"), "A", 120_000).unwrap())
            .unwrap();
        db.upsert_limit(&AppLimit::new(pkg("com.a"), "Alpha", 90_000).unwrap())
            .unwrap();

        let limits = db.list_limits().unwrap();
        assert_eq!(limits.len(), 2);
        assert_eq!(limits[0].display_name, "Alpha");
        assert_eq!(limits[0].limit_ms, 90_000);

        assert!(db.set_limit_enabled(&pkg("com.b"), false).unwrap());
        assert!(!db.set_limit_enabled(&pkg("com.missing"), false).unwrap());
        let enabled = db.enabled_limits().unwrap();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].package, pkg("com.a"));
        assert!(!db.limit_for(&pkg("com.b")).unwrap().unwrap().enabled);

        assert!(db.delete_limit(&pkg("com.a")).unwrap());
        assert!(!db.delete_limit(&pkg("com.a")).unwrap());
        assert_eq!(db.limit_for(&pkg("com.a")).unwrap(), None);
    }

    #[test]
    fn insert_events_is_idempotent() {
        let mut db = Database::open_in_memory().unwrap();
        let e = event("com.a", EventKind::Resumed, 0);
        assert_eq!(db.insert_events(&[e.clone(), e]).unwrap(), 1);
        assert_eq!(db.count_events().unwrap(), 1);
    }

    #[test]
    fn events_in_range_is_half_open_and_ordered() {
        let mut db = Database::open_in_memory().unwrap();
        let custom_tab = RawEvent::new(
            RawIdentity::new(pkg("com.android.chrome"), Some("CustomTabActivity".into())),
            EventKind::Resumed,
            ts(200),
        );
        db.insert_events(&[
            event("com.b", EventKind::Paused, 300),
            event("com.a", EventKind::Resumed, 100),
            EventRecord::from_event(custom_tab.clone()),
            event("com.a", EventKind::Paused, 1000),
        ])
        .unwrap();

        let events = db.events_in_range(TimeWindow::new(ts(100), ts(1000))).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].timestamp, ts(100));
        assert_eq!(events[1], custom_tab);
        assert_eq!(events[2].identity.package, pkg("com.b"));
        assert!(db.events_in_range(TimeWindow::new(ts(10), ts(10))).unwrap().is_empty());
    }

    #[test]
    fn package_info_round_trips() {
        let mut db = Database::open_in_memory().unwrap();
        let info = PackageInfo::user_app("Vendor")
            .with_owner_group(1001)
            .with_launchable(false)
            .with_system(true);
        db.upsert_package(&pkg("com.vendor"), &info).unwrap();
        assert_eq!(db.package_info(&pkg("com.vendor")).unwrap(), Some(info));
        assert_eq!(db.package_info(&pkg("com.none")).unwrap(), None);
    }

    #[test]
    fn replace_day_usage_replaces_day_and_tracks_last_sync() {
        let mut db = Database::open_in_memory().unwrap();
        assert_eq!(db.last_sync_date().unwrap(), None);

        db.replace_day_usage(date(2025, 1, 14), &[record("com.a", 100), record("com.b", 300)])
            .unwrap();
        db.replace_day_usage(date(2025, 1, 14), &[record("com.a", 500)])
            .unwrap();
        db.replace_day_usage(date(2025, 1, 12), &[record("com.a", 50)])
            .unwrap();

        // A rerun with fewer apps leaves no stale rows behind.
        let rows = db.historical_usage_for_day(date(2025, 1, 14)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].package, pkg("com.a"));
        assert_eq!(rows[0].total_usage_ms, 500);
        assert_eq!(db.last_sync_date().unwrap(), Some(date(2025, 1, 14)));
        assert_eq!(
            db.usage_total(UsageTable::Historical, date(2025, 1, 14)).unwrap(),
            500
        );
        assert_eq!(db.historical_usage_for_day(date(2025, 1, 12)).unwrap().len(), 1);
    }

    #[test]
    fn snapshot_is_replaced_wholesale_and_purged() {
        let mut db = Database::open_in_memory().unwrap();
        db.replace_snapshot(date(2025, 1, 1), &[record("com.old", 10)])
            .unwrap();
        db.replace_snapshot(date(2025, 1, 15), &[record("com.a", 100), record("com.b", 50)])
            .unwrap();
        db.replace_snapshot(date(2025, 1, 15), &[record("com.c", 70)])
            .unwrap();

        let rows = db.snapshot_for_day(date(2025, 1, 15)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].package, pkg("com.c"));

        assert_eq!(db.purge_snapshots_before(date(2025, 1, 10)).unwrap(), 1);
        assert!(db.snapshot_for_day(date(2025, 1, 1)).unwrap().is_empty());
        assert_eq!(db.last_sync_date().unwrap(), None);
    }

    #[test]
    fn shared_database_drives_the_usage_pipeline() {
        let mut db = Database::open_in_memory().unwrap();
        db.upsert_package(
            &pkg("com.vendor.app"),
            &PackageInfo::user_app("Vendor").with_owner_group(7),
        )
        .unwrap();
        db.upsert_package(
            &pkg("com.vendor.helper"),
            &PackageInfo::user_app("Helper")
                .with_owner_group(7)
                .with_launchable(false),
        )
        .unwrap();
        db.insert_events(&[
            event("com.vendor.helper", EventKind::Resumed, 0),
            event("com.vendor.helper", EventKind::Paused, 400),
            event("com.vendor.app", EventKind::Resumed, 400),
            event("com.vendor.app", EventKind::Paused, 1000),
            event("com.unknown", EventKind::Resumed, 1000),
            event("com.unknown", EventKind::Paused, 1200),
        ])
        .unwrap();

        let shared = SharedDatabase::new(db);
        let pipeline = UsagePipeline::new(
            Arc::new(shared.clone()),
            Arc::new(shared.clone()),
            Arc::new(StaticPermission(true)),
            PipelineConfig::new(pkg("dev.self")),
        );
        let records = pipeline
            .try_compute_usage(TimeWindow::new(ts(0), ts(2000)))
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].app.display_name, "Vendor");
        assert_eq!(records[0].duration_ms, 1000);

        let written = shared.replace_day_usage(date(2025, 1, 15), &records).unwrap();
        assert_eq!(written, 1);
        assert_eq!(shared.day_usage_total(date(2025, 1, 15)).unwrap(), 1000);

        // The helper alone still resolves to its app through the catalog.
        let helper_only = TimeWindow::new(ts(0), ts(400));
        assert_eq!(
            pipeline.app_usage(&pkg("com.vendor.app"), helper_only).unwrap(),
            400
        );
        assert_eq!(
            pipeline.logical_app(&pkg("com.vendor.helper")),
            pkg("com.vendor.app")
        );
    }

    #[test]
    fn owner_group_members_lists_catalog_packages() {
        let mut db = Database::open_in_memory().unwrap();
        for (name, group) in [("com.b", 3), ("com.a", 3), ("com.c", 4)] {
            db.upsert_package(&pkg(name), &PackageInfo::user_app(name).with_owner_group(group))
                .unwrap();
        }
        assert_eq!(
            db.owner_group_members(3).unwrap(),
            vec![pkg("com.a"), pkg("com.b")]
        );
        assert!(db.owner_group_members(9).unwrap().is_empty());
    }
}

//! Collaborator interfaces the pipeline and monitoring core depend on.
//!
//! Each trait is object safe so implementations can be shared across tasks as
//! `Arc<dyn Trait>`. The storage engine in `wb-db` implements all of them for
//! the recorded event log; an embedding platform supplies its own.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::RawEvent;
use crate::limit::AppLimit;
use crate::time::TimeWindow;
use crate::types::{OwnerGroupId, PackageName};
use crate::usage::UsageRecord;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The event source could not be queried.
#[derive(Debug, Error)]
#[error("event source query failed: {0}")]
pub struct SourceError(#[source] pub BoxError);

impl SourceError {
    pub fn new(err: impl Into<BoxError>) -> Self {
        Self(err.into())
    }
}

/// A persistence operation failed; callers should retry later.
#[derive(Debug, Error)]
#[error("storage operation failed: {0}")]
pub struct StoreError(#[source] pub BoxError);

impl StoreError {
    pub fn new(err: impl Into<BoxError>) -> Self {
        Self(err.into())
    }
}

/// Supplies ordered app-switch events for a window.
pub trait EventSource: Send + Sync {
    /// Events with `window.start <= timestamp < window.end`, ascending.
    fn query_events(&self, window: TimeWindow) -> Result<Vec<RawEvent>, SourceError>;
}

/// Installed-package metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    pub display_name: String,
    /// Shared platform account id, if the platform reports one.
    #[serde(default)]
    pub owner_group: Option<OwnerGroupId>,
    /// The package has a user-facing launch entry point.
    #[serde(default)]
    pub launchable: bool,
    /// The package ships with the system image.
    #[serde(default)]
    pub system: bool,
    /// A system package the user has updated (browsers, mail...).
    #[serde(default)]
    pub updated_system: bool,
}

impl PackageInfo {
    /// A user-installed package with a launcher entry.
    pub fn user_app(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            owner_group: None,
            launchable: true,
            system: false,
            updated_system: false,
        }
    }

    #[must_use]
    pub const fn with_owner_group(mut self, owner_group: OwnerGroupId) -> Self {
        self.owner_group = Some(owner_group);
        self
    }

    #[must_use]
    pub const fn with_launchable(mut self, launchable: bool) -> Self {
        self.launchable = launchable;
        self
    }

    #[must_use]
    pub const fn with_system(mut self, system: bool) -> Self {
        self.system = system;
        self
    }

    /// A pure system component: shipped with the image and never updated.
    pub const fn is_pure_system(&self) -> bool {
        self.system && !self.updated_system
    }
}

/// Looks up package metadata.
pub trait PackageCatalog: Send + Sync {
    /// `None` when the package is not installed or unknown.
    fn package_info(&self, package: &PackageName) -> Option<PackageInfo>;

    /// Every known package sharing `group`. Empty when the catalog cannot enumerate.
    fn owner_group_members(&self, _group: OwnerGroupId) -> Vec<PackageName> {
        Vec::new()
    }
}

/// Whether the event source may be queried at all.
pub trait PermissionCheck: Send + Sync {
    fn has_usage_access(&self) -> bool;
}

/// A permission gate with a fixed answer.
#[derive(Debug, Clone, Copy)]
pub struct StaticPermission(pub bool);

impl PermissionCheck for StaticPermission {
    fn has_usage_access(&self) -> bool {
        self.0
    }
}

/// Read access to user-configured budgets.
pub trait LimitsSource: Send + Sync {
    fn enabled_limits(&self) -> Result<Vec<AppLimit>, StoreError>;
}

/// Persisted per-day usage.
pub trait UsageStore: Send + Sync {
    /// The latest day present in historical usage.
    fn last_sync_date(&self) -> Result<Option<NaiveDate>, StoreError>;

    /// Sum of persisted historical usage for `day`.
    fn day_usage_total(&self, day: NaiveDate) -> Result<i64, StoreError>;

    /// Upserts `records` keyed by `(package, day)` in one transaction.
    fn replace_day_usage(&self, day: NaiveDate, records: &[UsageRecord])
    -> Result<usize, StoreError>;

    /// Sum of today's stored snapshot for `day`.
    fn snapshot_total(&self, day: NaiveDate) -> Result<i64, StoreError>;

    /// Replaces the stored snapshot for `day` in one transaction.
    fn replace_snapshot(&self, day: NaiveDate, records: &[UsageRecord])
    -> Result<usize, StoreError>;

    /// Deletes snapshots for days before `day`.
    fn purge_snapshots_before(&self, day: NaiveDate) -> Result<usize, StoreError>;
}

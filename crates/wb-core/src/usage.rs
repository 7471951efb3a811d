//! Per-app usage totals and ranked usage records.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{OwnerGroupId, PackageName};

/// Accumulated foreground time for one identity.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionTotals {
    /// Total credited time in milliseconds.
    pub duration_ms: i64,
    /// Most recent time the identity was seen in the foreground.
    pub last_used_at: Option<DateTime<Utc>>,
    /// Raw packages folded into this total (always includes the key itself).
    pub members: BTreeSet<PackageName>,
}

impl SessionTotals {
    pub(crate) fn credit(&mut self, duration_ms: i64, at: DateTime<Utc>) {
        self.duration_ms += duration_ms;
        self.touch(at);
    }

    pub(crate) fn touch(&mut self, at: DateTime<Utc>) {
        self.last_used_at = Some(self.last_used_at.map_or(at, |prev| prev.max(at)));
    }

    /// Folds `other` into `self`: durations add, last-used takes the max.
    pub(crate) fn absorb(&mut self, other: Self) {
        self.duration_ms += other.duration_ms;
        if let Some(at) = other.last_used_at {
            self.touch(at);
        }
        self.members.extend(other.members);
    }
}

/// Usage keyed by top-level package, in stable key order.
pub type UsageTotals = BTreeMap<PackageName, SessionTotals>;

/// The canonical, user-meaningful identity of an app after merging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalApp {
    pub key: PackageName,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_group: Option<OwnerGroupId>,
}

/// Usage of one logical app over a query window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub app: LogicalApp,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    /// Always within `[0, window_end - window_start]`.
    pub duration_ms: i64,
    pub last_used_at: DateTime<Utc>,
    /// Raw packages this record subsumes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<PackageName>,
}

impl UsageRecord {
    /// Whether this record accounts for `package`, directly or through a merge.
    pub fn covers(&self, package: &PackageName) -> bool {
        self.app.key == *package || self.members.contains(package)
    }
}

//! Filtering and ranking of merged usage.

use std::collections::BTreeSet;

use crate::source::PackageCatalog;
use crate::time::TimeWindow;
use crate::types::PackageName;
use crate::usage::{LogicalApp, UsageRecord, UsageTotals};

/// Drops non-user-facing identities and turns merged totals into ranked records.
#[derive(Debug, Clone)]
pub struct UsageFilter {
    own_package: PackageName,
    excluded: BTreeSet<PackageName>,
}

impl UsageFilter {
    pub fn new(own_package: PackageName, excluded: impl IntoIterator<Item = PackageName>) -> Self {
        Self {
            own_package,
            excluded: excluded.into_iter().collect(),
        }
    }

    pub const fn own_package(&self) -> &PackageName {
        &self.own_package
    }

    /// The embedding app itself or a permanently excluded identifier.
    pub fn is_excluded(&self, package: &PackageName) -> bool {
        *package == self.own_package || self.excluded.contains(package)
    }

    /// Filters, clamps and sorts `merged` for `window`.
    ///
    /// Records are sorted by descending duration, then by key.
    pub fn apply(
        &self,
        merged: UsageTotals,
        window: TimeWindow,
        catalog: &dyn PackageCatalog,
    ) -> Vec<UsageRecord> {
        let span_ms = window.span_ms();
        let mut records: Vec<UsageRecord> = merged
            .into_iter()
            .filter(|(package, totals)| totals.duration_ms > 0 && !self.is_excluded(package))
            .filter_map(|(package, totals)| {
                // Unknown packages are treated as pure system components.
                let info = catalog.package_info(&package);
                let user_facing = info
                    .as_ref()
                    .is_some_and(|info| info.launchable || !info.is_pure_system());
                if !user_facing {
                    tracing::trace!(%package, "dropping non user-facing package");
                    return None;
                }
                let duration_ms = if totals.duration_ms > span_ms {
                    tracing::debug!(
                        %package,
                        duration_ms = totals.duration_ms,
                        span_ms,
                        "clamping duration to window"
                    );
                    span_ms
                } else {
                    totals.duration_ms
                };
                let (display_name, owner_group) = info.map_or_else(
                    || (package.to_string(), None),
                    |info| (info.display_name, info.owner_group),
                );
                Some(UsageRecord {
                    app: LogicalApp {
                        key: package,
                        display_name,
                        owner_group,
                    },
                    window_start: window.start,
                    window_end: window.end,
                    duration_ms,
                    last_used_at: totals.last_used_at.unwrap_or(window.end),
                    members: totals.members.into_iter().collect(),
                })
            })
            .collect();

        records.sort_by(|a, b| {
            b.duration_ms
                .cmp(&a.duration_ms)
                .then_with(|| a.app.key.cmp(&b.app.key))
        });
        records
    }
}

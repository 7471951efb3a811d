//! The usage computation pipeline.
//!
//! Event source -> session reconstruction -> identity merging -> filter/rank.
//! The same pipeline serves on-demand queries, the foreground watcher, the
//! limit enforcer and the historical sync job.

use std::sync::Arc;

use thiserror::Error;

use crate::event::RawEvent;
use crate::filter::UsageFilter;
use crate::merge::{FamilyTable, IdentityMerger};
use crate::reconstruct::{ChildViewRule, last_resumed, reconstruct};
use crate::source::{EventSource, PackageCatalog, PermissionCheck, SourceError};
use crate::time::TimeWindow;
use crate::types::PackageName;
use crate::usage::UsageRecord;

/// Conditions that should change caller behavior.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Usage access has not been granted; nothing can be queried.
    #[error("usage access permission not granted")]
    PermissionDenied,
    /// A transient event source failure. An empty result is not zero usage.
    #[error(transparent)]
    EventQuery(#[from] SourceError),
}

/// Static pipeline settings.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// The embedding app, never reported.
    pub own_package: PackageName,
    /// Identifiers that are never reported.
    pub excluded_packages: Vec<PackageName>,
    pub child_views: ChildViewRule,
    pub families: FamilyTable,
}

impl PipelineConfig {
    pub fn new(own_package: PackageName) -> Self {
        Self {
            own_package,
            excluded_packages: PackageName::new("com.google.android.apps.wellbeing")
                .into_iter()
                .collect(),
            child_views: ChildViewRule::default(),
            families: FamilyTable::default(),
        }
    }
}

/// Computes ranked per-app usage for a window.
pub struct UsagePipeline {
    source: Arc<dyn EventSource>,
    catalog: Arc<dyn PackageCatalog>,
    permission: Arc<dyn PermissionCheck>,
    child_views: ChildViewRule,
    merger: IdentityMerger,
    filter: UsageFilter,
}

impl UsagePipeline {
    pub fn new(
        source: Arc<dyn EventSource>,
        catalog: Arc<dyn PackageCatalog>,
        permission: Arc<dyn PermissionCheck>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            source,
            catalog,
            permission,
            child_views: config.child_views,
            merger: IdentityMerger::new(config.families),
            filter: UsageFilter::new(config.own_package, config.excluded_packages),
        }
    }

    pub fn has_permission(&self) -> bool {
        self.permission.has_usage_access()
    }

    pub const fn filter(&self) -> &UsageFilter {
        &self.filter
    }

    fn events(&self, window: TimeWindow) -> Result<Vec<RawEvent>, PipelineError> {
        if !self.has_permission() {
            return Err(PipelineError::PermissionDenied);
        }
        if window.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.source.query_events(window)?)
    }

    /// Ranked usage for `window`, surfacing permission and query failures.
    pub fn try_compute_usage(
        &self,
        window: TimeWindow,
    ) -> Result<Vec<UsageRecord>, PipelineError> {
        let events = self.events(window)?;
        let totals = reconstruct(&events, window.end, &self.child_views);
        let merged = self.merger.merge(totals, self.catalog.as_ref());
        let records = self.filter.apply(merged, window, self.catalog.as_ref());
        tracing::debug!(
            events = events.len(),
            apps = records.len(),
            start = %window.start,
            end = %window.end,
            "computed usage"
        );
        Ok(records)
    }

    /// Ranked usage for `window`; failures yield an empty list.
    ///
    /// Use [`Self::try_compute_usage`] when the result may overwrite persisted totals.
    pub fn compute_usage(&self, window: TimeWindow) -> Vec<UsageRecord> {
        self.try_compute_usage(window).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "usage query failed, returning empty result");
            Vec::new()
        })
    }

    /// The logical app key `package` is reported under.
    pub fn logical_app(&self, package: &PackageName) -> PackageName {
        self.merger.logical_key(package, self.catalog.as_ref())
    }

    /// Usage of the logical app that accounts for `package`.
    ///
    /// Unlike [`Self::try_compute_usage`] this keeps packages the catalog does
    /// not know; only the exclusion list applies.
    pub fn app_usage(
        &self,
        package: &PackageName,
        window: TimeWindow,
    ) -> Result<i64, PipelineError> {
        let events = self.events(window)?;
        let key = self.logical_app(package);
        if self.filter.is_excluded(package) || self.filter.is_excluded(&key) {
            return Ok(0);
        }
        let totals = reconstruct(&events, window.end, &self.child_views);
        let merged = self.merger.merge(totals, self.catalog.as_ref());
        let duration_ms: i64 = merged
            .iter()
            .filter(|(merged_key, totals)| **merged_key == key || totals.members.contains(package))
            .map(|(_, totals)| totals.duration_ms)
            .sum();
        Ok(duration_ms.clamp(0, window.span_ms()))
    }

    /// The logical app most recently brought to the foreground in `window`.
    ///
    /// `previous` is the caller's last known foreground app. A child view
    /// resumed with no top-level app before it in `window` belongs to it.
    pub fn foreground_app(
        &self,
        window: TimeWindow,
        previous: Option<&PackageName>,
    ) -> Result<Option<PackageName>, PipelineError> {
        let events = self.events(window)?;
        Ok(last_resumed(&events, &self.child_views, previous)
            .map(|package| self.logical_app(&package)))
    }
}

//! Core domain logic for wellbeing usage tracking.
//!
//! This crate contains the fundamental types and logic for:
//! - Reconstruction: turning foreground/background events into durations
//! - Identity merging: collapsing helper packages into one logical app
//! - Filtering and ranking of per-app usage for a time window
//! - Historical sync of completed days into a [`UsageStore`]
//!
//! Event sources, package metadata and storage are abstracted behind the
//! traits in [`source`], so the pipeline runs unchanged against a live
//! platform, a database or in-memory fakes.

pub mod event;
mod filter;
mod limit;
pub mod merge;
mod pipeline;
pub mod reconstruct;
pub mod source;
pub mod sync;
pub mod time;
mod types;
mod usage;

pub use event::{EventKind, RawEvent, RawIdentity};
pub use filter::UsageFilter;
pub use limit::{AppLimit, format_limit, format_usage};
pub use merge::{FamilyRule, FamilyTable, IdentityMerger};
pub use pipeline::{PipelineConfig, PipelineError, UsagePipeline};
pub use reconstruct::{ChildViewRule, last_resumed, reconstruct};
pub use source::{
    EventSource, LimitsSource, PackageCatalog, PackageInfo, PermissionCheck, SourceError,
    StaticPermission, StoreError, UsageStore,
};
pub use sync::{HistoricalSync, SnapshotOutcome, SyncError, SyncOutcome, days_to_sync};
pub use time::{Clock, ManualClock, SystemClock, TimeWindow, day_window, days_inclusive};
pub use types::{OwnerGroupId, PackageName, ValidationError};
pub use usage::{LogicalApp, SessionTotals, UsageRecord, UsageTotals};

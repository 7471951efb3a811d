//! Fakes shared by the monitoring tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{Duration, TimeZone, Utc};
use wb_core::{
    AppLimit, Clock, EventKind, EventSource, LimitsSource, ManualClock, OwnerGroupId,
    PackageCatalog, PackageInfo, PackageName, PermissionCheck, PipelineConfig, RawEvent,
    RawIdentity, SourceError, StoreError, TimeWindow, UsagePipeline,
};

use crate::enforcer::{BlockDispatcher, BlockRequest};

pub fn pkg(name: &str) -> PackageName {
    PackageName::new(name).unwrap()
}

#[derive(Default)]
pub struct FakeSource {
    events: Mutex<Vec<RawEvent>>,
    failing: AtomicBool,
    queries: AtomicUsize,
}

impl FakeSource {
    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl EventSource for FakeSource {
    fn query_events(&self, window: TimeWindow) -> Result<Vec<RawEvent>, SourceError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(SourceError::new("source unavailable"));
        }
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| window.contains(e.timestamp))
            .cloned()
            .collect())
    }
}

pub const CUSTOM_TAB: &str = "org.chromium.chrome.browser.customtabs.CustomTabActivity";

pub struct AnyApp;

impl PackageCatalog for AnyApp {
    fn package_info(&self, package: &PackageName) -> Option<PackageInfo> {
        Some(PackageInfo::user_app(package.as_str().to_uppercase()))
    }
}

/// Knows nothing about any package.
pub struct EmptyCatalog;

impl PackageCatalog for EmptyCatalog {
    fn package_info(&self, _package: &PackageName) -> Option<PackageInfo> {
        None
    }
}

/// Like [`AnyApp`], with `com.vendor.app` and its non-launchable
/// `com.vendor.helper` sharing one owner group.
pub struct OwnerGroups;

const VENDOR_GROUP: OwnerGroupId = 10_123;

impl PackageCatalog for OwnerGroups {
    fn package_info(&self, package: &PackageName) -> Option<PackageInfo> {
        let info = PackageInfo::user_app(package.as_str().to_uppercase());
        Some(match package.as_str() {
            "com.vendor.app" => info.with_owner_group(VENDOR_GROUP),
            "com.vendor.helper" => info.with_owner_group(VENDOR_GROUP).with_launchable(false),
            _ => info,
        })
    }

    fn owner_group_members(&self, group: OwnerGroupId) -> Vec<PackageName> {
        if group == VENDOR_GROUP {
            vec![pkg("com.vendor.app"), pkg("com.vendor.helper")]
        } else {
            Vec::new()
        }
    }
}

pub struct Permission(pub AtomicBool);

impl PermissionCheck for Permission {
    fn has_usage_access(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct FakeLimits {
    limits: Mutex<Vec<AppLimit>>,
    pub failing: AtomicBool,
}

impl FakeLimits {
    pub fn set(&self, name: &str, limit_ms: i64) {
        let limit = AppLimit::new(pkg(name), name.to_uppercase(), limit_ms).unwrap();
        let mut limits = self.limits.lock().unwrap();
        limits.retain(|l| l.package != limit.package);
        limits.push(limit);
    }

    pub fn clear(&self) {
        self.limits.lock().unwrap().clear();
    }
}

impl LimitsSource for FakeLimits {
    fn enabled_limits(&self) -> Result<Vec<AppLimit>, StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::new("limits unavailable"));
        }
        Ok(self.limits.lock().unwrap().clone())
    }
}

#[derive(Default)]
pub struct RecordingDispatcher {
    requests: Mutex<Vec<BlockRequest>>,
}

impl RecordingDispatcher {
    pub fn requests(&self) -> Vec<BlockRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl BlockDispatcher for RecordingDispatcher {
    fn dispatch(&self, request: &BlockRequest) {
        self.requests.lock().unwrap().push(request.clone());
    }
}

/// A clock stopped at noon UTC plus the collaborators around it.
pub struct Fixture {
    pub clock: Arc<ManualClock>,
    pub source: Arc<FakeSource>,
    pub permission: Arc<Permission>,
    pub limits: Arc<FakeLimits>,
    pub dispatcher: Arc<RecordingDispatcher>,
}

impl Fixture {
    pub fn new() -> Self {
        let noon = Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap();
        Self {
            clock: Arc::new(ManualClock::utc(noon)),
            source: Arc::new(FakeSource::default()),
            permission: Arc::new(Permission(AtomicBool::new(true))),
            limits: Arc::new(FakeLimits::default()),
            dispatcher: Arc::new(RecordingDispatcher::default()),
        }
    }

    /// Records an event `offset_ms` from the clock's current time.
    pub fn push(&self, name: &str, kind: EventKind, offset_ms: i64) {
        self.push_identity(RawIdentity::package(pkg(name)), kind, offset_ms);
    }

    /// Records an event for one view of `name`.
    pub fn push_view(&self, name: &str, view: &str, kind: EventKind, offset_ms: i64) {
        self.push_identity(
            RawIdentity::new(pkg(name), Some(view.to_string())),
            kind,
            offset_ms,
        );
    }

    fn push_identity(&self, identity: RawIdentity, kind: EventKind, offset_ms: i64) {
        let at = self.clock.now() + Duration::milliseconds(offset_ms);
        self.source
            .events
            .lock()
            .unwrap()
            .push(RawEvent::new(identity, kind, at));
    }

    pub fn pipeline(&self) -> Arc<UsagePipeline> {
        self.pipeline_with(Arc::new(AnyApp))
    }

    pub fn pipeline_with(&self, catalog: Arc<dyn PackageCatalog>) -> Arc<UsagePipeline> {
        Arc::new(UsagePipeline::new(
            self.source.clone(),
            catalog,
            self.permission.clone(),
            PipelineConfig::new(pkg("dev.self")),
        ))
    }
}

use tokio::sync::watch;
use wb_core::PackageName;

/// What the monitoring core currently believes.
///
/// Published through a `watch` channel. The watcher is the only writer of
/// `current_foreground_app`; the enforcer is the only writer of
/// `active_enforcer_app`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitoringState {
    pub current_foreground_app: Option<PackageName>,
    /// The app the enforcer is watching, if it has an enabled limit.
    pub active_enforcer_app: Option<PackageName>,
}

pub(crate) type StateSender = watch::Sender<MonitoringState>;

use thiserror::Error;
use wb_core::StoreError;

/// Monitoring service errors.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Usage access is not granted; monitoring does not start.
    #[error("usage access permission not granted")]
    PermissionDenied,
    #[error("monitoring is already running")]
    AlreadyRunning,
    /// Limits could not be read at start.
    #[error("failed to read app limits: {0}")]
    Limits(#[from] StoreError),
}

//! Foreground monitoring and limit enforcement.
//!
//! Three task families run under one cancellation token:
//! - The [`ForegroundWatcher`] samples the event source on a fast interval
//!   and sends a foreground-changed signal over a channel.
//! - The [`LimitEnforcer`] keeps at most one watch task alive for the
//!   current app and dispatches a [`BlockRequest`] once today's usage reaches
//!   its limit.
//! - The sync scheduler runs [`wb_core::HistoricalSync`] at start and after
//!   every local midnight.
//!
//! [`MonitoringService`] owns the tasks and publishes [`MonitoringState`].

mod enforcer;
mod error;
pub mod scheduler;
mod service;
mod state;
#[cfg(test)]
mod testing;
mod watcher;

pub use enforcer::{BlockDispatcher, BlockRequest, EnforcerState, LimitEnforcer};
pub use error::MonitorError;
pub use service::{MonitorConfig, MonitorDeps, MonitoringService};
pub use state::MonitoringState;
pub use watcher::{ForegroundWatcher, WatcherConfig, WatcherState};

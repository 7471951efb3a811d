//! Raw app-switch events as delivered by an event source.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{PackageName, ValidationError};

/// Whether an identity became visible or left the foreground.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Resumed,
    Paused,
}

impl EventKind {
    /// String representation for database storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Resumed => "resumed",
            Self::Paused => "paused",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "resumed" | "activity_resumed" | "move_to_foreground" => Ok(Self::Resumed),
            "paused" | "activity_paused" | "move_to_background" => Ok(Self::Paused),
            _ => Err(ValidationError::InvalidEventKind {
                value: s.to_string(),
            }),
        }
    }
}

/// A low-level app/view identifier.
///
/// The `view` qualifier is the class of the screen that changed state. It is
/// what distinguishes an app's own screen from an ephemeral view embedded in
/// it, such as an in-app browser tab.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RawIdentity {
    pub package: PackageName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<String>,
}

impl RawIdentity {
    pub const fn new(package: PackageName, view: Option<String>) -> Self {
        Self { package, view }
    }

    /// An identity with no view qualifier.
    pub const fn package(package: PackageName) -> Self {
        Self {
            package,
            view: None,
        }
    }
}

impl fmt::Display for RawIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.view {
            Some(view) => write!(f, "{}/{view}", self.package),
            None => write!(f, "{}", self.package),
        }
    }
}

/// One app-switch signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    pub identity: RawIdentity,
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
}

impl RawEvent {
    pub const fn new(identity: RawIdentity, kind: EventKind, timestamp: DateTime<Utc>) -> Self {
        Self {
            identity,
            kind,
            timestamp,
        }
    }
}

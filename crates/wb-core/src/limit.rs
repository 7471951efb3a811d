//! User-configured daily budgets and their display formatting.

use serde::{Deserialize, Serialize};

use crate::types::{PackageName, ValidationError};

const MINUTE_MS: i64 = 60 * 1000;
const HOUR_MS: i64 = 60 * MINUTE_MS;

/// A daily time budget for one package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppLimit {
    pub package: PackageName,
    pub display_name: String,
    pub limit_ms: i64,
    pub enabled: bool,
}

impl AppLimit {
    /// Creates an enabled limit.
    pub fn new(
        package: PackageName,
        display_name: impl Into<String>,
        limit_ms: i64,
    ) -> Result<Self, ValidationError> {
        if limit_ms <= 0 {
            return Err(ValidationError::NonPositiveLimit { value: limit_ms });
        }
        Ok(Self {
            package,
            display_name: display_name.into(),
            limit_ms,
            enabled: true,
        })
    }

    /// Whether `usage_ms` has reached the budget.
    pub const fn is_exceeded_by(&self, usage_ms: i64) -> bool {
        usage_ms >= self.limit_ms
    }
}

/// Formats a limit for the block notice: `1h 30m`, `45m`, or `1m` for anything shorter.
pub fn format_limit(limit_ms: i64) -> String {
    let hours = limit_ms / HOUR_MS;
    let minutes = (limit_ms % HOUR_MS) / MINUTE_MS;
    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m")
    } else {
        "1m".to_string()
    }
}

/// Formats a usage total: `2h 5m`, `12m`, `<1m` for sub-minute use, `0m` for none.
pub fn format_usage(usage_ms: i64) -> String {
    let hours = usage_ms / HOUR_MS;
    let minutes = (usage_ms % HOUR_MS) / MINUTE_MS;
    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m")
    } else if usage_ms > 0 {
        "<1m".to_string()
    } else {
        "0m".to_string()
    }
}

//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use wb_core::{ChildViewRule, FamilyTable, PackageName, PipelineConfig, ValidationError};
use wb_monitor::{MonitorConfig, WatcherConfig};

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,
    /// The embedding app's own identifier; never reported or blocked.
    pub own_package: String,
    /// Identifiers that are never reported.
    pub excluded_packages: Vec<String>,
    /// Foreground surfaces that never count as an app switch.
    pub system_surfaces: Vec<String>,
    pub watcher_interval_ms: u64,
    pub watcher_lookback_ms: u64,
    pub enforcer_interval_ms: u64,
    /// Days covered by the first historical sync.
    pub first_sync_days: u32,
    pub snapshot_retention_days: u32,
    /// Replaces the built-in family table when set.
    #[serde(default)]
    pub family_rules: Option<FamilyTable>,
    pub child_views: ChildViewRule,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("own_package", &self.own_package)
            .field("excluded_packages", &self.excluded_packages.len())
            .field("system_surfaces", &self.system_surfaces.len())
            .field("watcher_interval_ms", &self.watcher_interval_ms)
            .field("watcher_lookback_ms", &self.watcher_lookback_ms)
            .field("enforcer_interval_ms", &self.enforcer_interval_ms)
            .field("first_sync_days", &self.first_sync_days)
            .field("snapshot_retention_days", &self.snapshot_retention_days)
            .field(
                "family_rules",
                &self.family_rules.as_ref().map(|table| table.rules().len()),
            )
            .finish_non_exhaustive()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("wb.db"),
            own_package: "dev.wellbeing.wb".to_string(),
            excluded_packages: vec!["com.google.android.apps.wellbeing".to_string()],
            system_surfaces: WatcherConfig::default()
                .system_surfaces
                .into_iter()
                .map(String::from)
                .collect(),
            watcher_interval_ms: 1000,
            watcher_lookback_ms: 2000,
            enforcer_interval_ms: 90_000,
            first_sync_days: 7,
            snapshot_retention_days: 30,
            family_rules: None,
            child_views: ChildViewRule::default(),
        }
    }
}

fn package_names(names: &[String]) -> Result<Vec<PackageName>, ValidationError> {
    names.iter().map(|name| PackageName::new(name.as_str())).collect()
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (WB_*)
        figment = figment.merge(Env::prefixed("WB_"));

        figment.extract()
    }

    pub fn pipeline_config(&self) -> Result<PipelineConfig, ValidationError> {
        Ok(PipelineConfig {
            own_package: PackageName::new(self.own_package.as_str())?,
            excluded_packages: package_names(&self.excluded_packages)?,
            child_views: self.child_views.clone(),
            families: self.family_rules.clone().unwrap_or_default(),
        })
    }

    pub fn monitor_config(&self) -> Result<MonitorConfig, ValidationError> {
        Ok(MonitorConfig {
            watcher: WatcherConfig {
                interval: Duration::from_millis(self.watcher_interval_ms),
                lookback: Duration::from_millis(self.watcher_lookback_ms),
                system_surfaces: package_names(&self.system_surfaces)?.into_iter().collect(),
            },
            enforcer_interval: Duration::from_millis(self.enforcer_interval_ms),
        })
    }
}

/// Returns the platform-specific config directory for wb.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("wb"))
}

/// Returns the platform-specific data directory for wb.
///
/// On Linux: `~/.local/share/wb`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("wb"))
}

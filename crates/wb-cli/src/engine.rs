//! Wiring of the usage pipeline over the local database.

use std::sync::Arc;

use wb_core::{Clock, HistoricalSync, StaticPermission, UsagePipeline, ValidationError};
use wb_db::{Database, SharedDatabase};

use crate::Config;

/// The database plus the pipeline reading from it.
pub struct Engine {
    pub db: SharedDatabase,
    pub pipeline: Arc<UsagePipeline>,
    pub clock: Arc<dyn Clock>,
}

impl Engine {
    /// The recorded event log needs no platform permission, so access is always granted.
    pub fn new(
        db: Database,
        config: &Config,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ValidationError> {
        let db = SharedDatabase::new(db);
        let pipeline = UsagePipeline::new(
            Arc::new(db.clone()),
            Arc::new(db.clone()),
            Arc::new(StaticPermission(true)),
            config.pipeline_config()?,
        );
        Ok(Self {
            db,
            pipeline: Arc::new(pipeline),
            clock,
        })
    }

    pub fn historical_sync(&self, config: &Config) -> HistoricalSync {
        HistoricalSync::new(
            Arc::clone(&self.pipeline),
            Arc::new(self.db.clone()),
            Arc::clone(&self.clock),
        )
        .with_first_sync_days(config.first_sync_days)
        .with_snapshot_retention_days(config.snapshot_retention_days)
    }
}

//! Application state.

use clipshare_media::Toolchain;
use clipshare_store::{Database, StoreResult};
use clipshare_worker::{ClipExportService, RecoverySweep, ShotCutService, StartupRecovery};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub db: Database,
    pub shot_cuts: ShotCutService,
    pub exports: ClipExportService,
    pub recovery: StartupRecovery,
    pub toolchain: Toolchain,
}

impl AppState {
    /// Open the database and build the background services.
    pub fn new(config: ApiConfig) -> StoreResult<Self> {
        let db = Database::open(&config.database_path)?;
        Ok(Self::with_database(config, db))
    }

    pub fn with_database(config: ApiConfig, db: Database) -> Self {
        let shot_cuts = ShotCutService::new(db.clone(), &config.worker);
        let exports = ClipExportService::new(db.clone(), &config.worker);
        Self::with_services(config, db, shot_cuts, exports)
    }

    pub fn with_services(
        config: ApiConfig,
        db: Database,
        shot_cuts: ShotCutService,
        exports: ClipExportService,
    ) -> Self {
        let sweep = RecoverySweep::new(db.clone()).sparing_lease_owner(shot_cuts.lease_owner());
        Self {
            toolchain: config.worker.toolchain(),
            recovery: StartupRecovery::new(sweep),
            config,
            db,
            shot_cuts,
            exports,
        }
    }
}

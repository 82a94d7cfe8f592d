//! Backup initiation
//!
//! Runs xtrabackup and streams its output, gzip-compressed, to the
//! catalog's ingest endpoints:
//!
//! - full: `--stream tar` → `POST /api/full-backup/{db}`
//! - incremental: `--stream xbstream --incremental-lsn <lsn>` →
//!   `POST /api/{db}/inc-backup/{lsn}`
//!
//! An incremental run first asks the catalog for the last LSN of the
//! database. Without one there is nothing to increment from and the run is
//! reported as [`BackupOutcome::Skipped`].

mod command;
mod errors;
mod upload;

pub use command::XtrabackupCommand;
pub use errors::{BackupError, BackupResult};
pub use upload::stream_to_sink;

use tracing::{info, warn};

use crate::catalog::{Catalog, IngestSink, IngestTarget, LsnLookup};
use crate::config::MysqlConfig;

/// What a backup run did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupOutcome {
    /// Stream accepted by the catalog and producer exited cleanly
    Uploaded { bytes: u64 },
    /// Nothing attempted (no LSN to increment from)
    Skipped,
}

/// Produces backups of one MySQL server into one catalog
pub struct BackupProducer<'a, C: Catalog + IngestSink + ?Sized> {
    catalog: &'a C,
    mysql: &'a MysqlConfig,
}

impl<'a, C: Catalog + IngestSink + ?Sized> BackupProducer<'a, C> {
    pub fn new(catalog: &'a C, mysql: &'a MysqlConfig) -> Self {
        Self { catalog, mysql }
    }

    pub fn full_backup(&self, db: &str) -> BackupResult<BackupOutcome> {
        self.mysql.validate()?;

        let cmd = XtrabackupCommand::full_backup(self.mysql);
        let target = IngestTarget::Full { db: db.to_string() };
        let bytes = stream_to_sink(&cmd, self.catalog, &target)?;

        info!(db = %db, bytes, "full backup uploaded");
        Ok(BackupOutcome::Uploaded { bytes })
    }

    pub fn incremental_backup(&self, db: &str) -> BackupResult<BackupOutcome> {
        self.mysql.validate()?;

        let lsn = match self.catalog.last_lsn(db).map_err(BackupError::Catalog)? {
            LsnLookup::Found(lsn) => lsn,
            LsnLookup::Unavailable => {
                warn!(db = %db, "no last LSN recorded, skipping incremental backup");
                return Ok(BackupOutcome::Skipped);
            }
        };
        info!(db = %db, lsn = %lsn, "incremental backup from last LSN");

        let cmd = XtrabackupCommand::incremental_backup(self.mysql, &lsn);
        let target = IngestTarget::Incremental {
            db: db.to_string(),
            lsn,
        };
        let bytes = stream_to_sink(&cmd, self.catalog, &target)?;

        info!(db = %db, bytes, "incremental backup uploaded");
        Ok(BackupOutcome::Uploaded { bytes })
    }
}

//! Backup-specific error types
//!
//! A backup run fails when the producer cannot be started, when it exits
//! unsuccessfully, or when the catalog rejects the upload. Backup failures
//! never touch existing artifacts.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::config::ConfigError;

/// Result type for backup operations
pub type BackupResult<T> = Result<T, BackupError>;

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("invalid backup configuration: {0}")]
    Config(#[from] ConfigError),

    /// LSN lookup failed for a reason other than "no base yet"
    #[error("catalog lookup failed: {0}")]
    Catalog(#[source] CatalogError),

    #[error("failed to start {}: {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("upload to catalog failed: {0}")]
    Upload(#[source] CatalogError),

    /// The producer exited unsuccessfully; the upload was aborted
    #[error("{} exited unsuccessfully ({status})", program.display())]
    ProducerFailed { program: PathBuf, status: String },

    #[error("I/O error waiting for producer: {0}")]
    Io(#[from] io::Error),
}

//! Restore-specific error types
//!
//! Every restore error carries a stable code in `XTRALAB_RESTORE_*` form.
//! All restore errors are FATAL: nothing is retried, and the partial
//! workspace is left on disk for inspection.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::catalog::{ArtifactKey, CatalogError};
use crate::config::ConfigError;
use crate::fetch::FetchError;
use crate::unpack::UnpackError;

/// Restore error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreErrorCode {
    CatalogUnavailable,
    NoChain,
    Fetch,
    Unpack,
    Workspace,
    Cancelled,
    Prepare,
    Config,
}

impl RestoreErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestoreErrorCode::CatalogUnavailable => "XTRALAB_RESTORE_CATALOG_UNAVAILABLE",
            RestoreErrorCode::NoChain => "XTRALAB_RESTORE_NO_CHAIN",
            RestoreErrorCode::Fetch => "XTRALAB_RESTORE_FETCH",
            RestoreErrorCode::Unpack => "XTRALAB_RESTORE_UNPACK",
            RestoreErrorCode::Workspace => "XTRALAB_RESTORE_WORKSPACE",
            RestoreErrorCode::Cancelled => "XTRALAB_RESTORE_CANCELLED",
            RestoreErrorCode::Prepare => "XTRALAB_RESTORE_PREPARE",
            RestoreErrorCode::Config => "XTRALAB_RESTORE_CONFIG",
        }
    }
}

impl fmt::Display for RestoreErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Restore failure
#[derive(Debug, Error)]
pub enum RestoreError {
    /// Chain query failed (transport error, timeout or non-2xx)
    #[error("catalog unavailable: {0}")]
    CatalogUnavailable(#[source] CatalogError),

    /// Catalog has nothing to restore for the query
    #[error("no backup chain for database {db:?} as of {from:?}")]
    NoChain { db: String, from: String },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("failed to unpack {key}: {source}")]
    Unpack {
        key: ArtifactKey,
        #[source]
        source: UnpackError,
    },

    #[error("workspace error at {}: {source}", path.display())]
    Workspace {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Stopped between artifacts on request
    #[error("restore cancelled after {completed} of {total} artifacts")]
    Cancelled { completed: usize, total: usize },

    #[error("prepare step {step} failed: {reason}")]
    Prepare { step: String, reason: String },

    #[error("invalid restore options: {0}")]
    Config(#[from] ConfigError),
}

impl RestoreError {
    pub fn code(&self) -> RestoreErrorCode {
        match self {
            RestoreError::CatalogUnavailable(_) => RestoreErrorCode::CatalogUnavailable,
            RestoreError::NoChain { .. } => RestoreErrorCode::NoChain,
            RestoreError::Fetch(_) => RestoreErrorCode::Fetch,
            RestoreError::Unpack { .. } => RestoreErrorCode::Unpack,
            RestoreError::Workspace { .. } => RestoreErrorCode::Workspace,
            RestoreError::Cancelled { .. } => RestoreErrorCode::Cancelled,
            RestoreError::Prepare { .. } => RestoreErrorCode::Prepare,
            RestoreError::Config(_) => RestoreErrorCode::Config,
        }
    }

    /// Restore errors are always fatal: the operator re-runs the restore
    pub fn is_fatal(&self) -> bool {
        true
    }

    /// Artifact the failure concerns, if any
    pub fn artifact(&self) -> Option<&ArtifactKey> {
        match self {
            RestoreError::Fetch(e) => Some(e.key()),
            RestoreError::Unpack { key, .. } => Some(key),
            _ => None,
        }
    }
}

/// Result type for restore operations
pub type RestoreResult<T> = Result<T, RestoreError>;

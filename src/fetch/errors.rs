//! Fetch error types

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::catalog::{ArtifactKey, CatalogError};

/// Result type for artifact fetches
pub type FetchResult<T> = Result<T, FetchError>;

/// Artifact download failure. Always names the artifact.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to fetch {key}: {source}")]
    Catalog {
        key: ArtifactKey,
        source: CatalogError,
    },

    #[error("I/O error fetching {key} into {}: {source}", path.display())]
    Io {
        key: ArtifactKey,
        path: PathBuf,
        source: io::Error,
    },

    #[error("artifact {key} truncated: expected {expected} bytes, received {received}")]
    Truncated {
        key: ArtifactKey,
        expected: u64,
        received: u64,
    },
}

impl FetchError {
    /// The artifact that failed
    pub fn key(&self) -> &ArtifactKey {
        match self {
            FetchError::Catalog { key, .. }
            | FetchError::Io { key, .. }
            | FetchError::Truncated { key, .. } => key,
        }
    }
}

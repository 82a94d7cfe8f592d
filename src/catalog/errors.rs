//! Catalog error types

use thiserror::Error;

/// Result type for catalog operations
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Failure talking to the backup catalog.
///
/// Timeouts are reported as `Transport`, the same as any other
/// connection-level failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("catalog request {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("catalog returned HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("malformed catalog response from {url}: {message}")]
    Malformed { url: String, message: String },

    #[error("invalid catalog endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("artifact not found: {0}")]
    ArtifactNotFound(String),
}

impl CatalogError {
    /// HTTP status carried by this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            CatalogError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

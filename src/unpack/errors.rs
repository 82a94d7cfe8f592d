//! Unpack error types

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type for unpack operations
pub type UnpackResult<T> = Result<T, UnpackError>;

/// Pipeline stage that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnpackStage {
    /// gzip decoding of the fetched artifact
    Decompress,
    /// tar or xbstream extraction onto disk
    Extract,
}

impl fmt::Display for UnpackStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnpackStage::Decompress => write!(f, "decompress"),
            UnpackStage::Extract => write!(f, "extract"),
        }
    }
}

/// Decompression or extraction failure
#[derive(Debug, Error)]
#[error("{stage} failed for {}: {source}", path.display())]
pub struct UnpackError {
    pub stage: UnpackStage,
    /// File being read or directory being written when the stage failed
    pub path: PathBuf,
    pub source: io::Error,
}

impl UnpackError {
    pub fn decompress(path: &Path, source: io::Error) -> Self {
        Self {
            stage: UnpackStage::Decompress,
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn extract(path: &Path, source: io::Error) -> Self {
        Self {
            stage: UnpackStage::Extract,
            path: path.to_path_buf(),
            source,
        }
    }
}

//! CLI-specific error types
//!
//! Every CLI failure maps to a message on stderr and a non-zero exit code.

use std::fmt;

use crate::backup::BackupError;
use crate::catalog::CatalogError;
use crate::config::ConfigError;
use crate::restore::RestoreError;

/// Exit code for a failed command
pub const EXIT_FAILURE: i32 = 1;

/// Exit code when an incremental backup was skipped for lack of an LSN
pub const EXIT_SKIPPED: i32 = 3;

/// CLI error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliErrorCode {
    ConfigError,
    IoError,
    CatalogError,
    RestoreFailed,
    BackupFailed,
    BackupSkipped,
}

impl CliErrorCode {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "XTRALAB_CLI_CONFIG_ERROR",
            Self::IoError => "XTRALAB_CLI_IO_ERROR",
            Self::CatalogError => "XTRALAB_CLI_CATALOG_ERROR",
            Self::RestoreFailed => "XTRALAB_CLI_RESTORE_FAILED",
            Self::BackupFailed => "XTRALAB_CLI_BACKUP_FAILED",
            Self::BackupSkipped => "XTRALAB_CLI_BACKUP_SKIPPED",
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::BackupSkipped => EXIT_SKIPPED,
            _ => EXIT_FAILURE,
        }
    }
}

/// CLI error
#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn backup_skipped(db: &str) -> Self {
        Self::new(
            CliErrorCode::BackupSkipped,
            format!("no last LSN recorded for {}; incremental backup skipped", db),
        )
    }

    pub fn code(&self) -> CliErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn exit_code(&self) -> i32 {
        self.code.exit_code()
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        Self::new(CliErrorCode::ConfigError, err.to_string())
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::new(CliErrorCode::IoError, err.to_string())
    }
}

impl From<CatalogError> for CliError {
    fn from(err: CatalogError) -> Self {
        Self::new(CliErrorCode::CatalogError, err.to_string())
    }
}

impl From<RestoreError> for CliError {
    fn from(err: RestoreError) -> Self {
        Self::new(
            CliErrorCode::RestoreFailed,
            format!("[{}] {}", err.code(), err),
        )
    }
}

impl From<BackupError> for CliError {
    fn from(err: BackupError) -> Self {
        Self::new(CliErrorCode::BackupFailed, err.to_string())
    }
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

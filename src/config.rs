//! Configuration for catalog access, backup production and restore
//!
//! Every struct here is built once from command-line flags and then only
//! read. Components receive them by reference.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Default catalog port used by the lab service.
pub const DEFAULT_CATALOG_PORT: u16 = 10109;

/// Default timeout applied to every catalog request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing required value: {0}")]
    Missing(&'static str),

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Result type for configuration validation
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Location of the backup catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogConfig {
    /// Catalog host name or address
    pub host: String,

    /// Catalog port (default: 10109)
    pub port: u16,

    /// Connect/read/write timeout for every request (default: 30s)
    pub timeout: Duration,
}

impl CatalogConfig {
    /// Create a config with the default timeout
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Replace the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Base URL of the catalog, without trailing slash
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Missing("catalog host"));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid {
                field: "catalog port",
                reason: "must be > 0".to_string(),
            });
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "timeout",
                reason: "must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

/// MySQL connection and xtrabackup invocation settings
#[derive(Clone, PartialEq, Eq)]
pub struct MysqlConfig {
    /// MySQL host (default: "127.0.0.1")
    pub host: String,

    /// MySQL port (default: 3306)
    pub port: u16,

    pub user: String,

    /// Optional; never logged
    pub password: Option<String>,

    /// Passed as `--defaults-file` when set
    pub defaults_file: Option<PathBuf>,

    /// xtrabackup binary (default: "xtrabackup")
    pub xtrabackup_bin: PathBuf,

    /// xtrabackup `--parallel` (default: 1)
    pub parallel: u32,
}

impl MysqlConfig {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3306,
            user: user.into(),
            password: None,
            defaults_file: None,
            xtrabackup_bin: PathBuf::from("xtrabackup"),
            parallel: 1,
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.user.trim().is_empty() {
            return Err(ConfigError::Missing("mysql user"));
        }
        if self.host.trim().is_empty() {
            return Err(ConfigError::Missing("mysql host"));
        }
        if self.parallel == 0 {
            return Err(ConfigError::Invalid {
                field: "parallel",
                reason: "must be >= 1".to_string(),
            });
        }
        Ok(())
    }
}

// Hand-written so the password never reaches a log line.
impl std::fmt::Debug for MysqlConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MysqlConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("defaults_file", &self.defaults_file)
            .field("xtrabackup_bin", &self.xtrabackup_bin)
            .field("parallel", &self.parallel)
            .finish()
    }
}

/// Options controlling a single restore invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreOptions {
    /// Directory in which the workspace is created (default: system temp dir)
    pub workspace_parent: Option<PathBuf>,

    /// Download limit in bytes per second; unlimited when `None`
    pub max_bandwidth: Option<u64>,

    /// Run the xtrabackup prepare step after all artifacts are unpacked
    pub apply_prepare: bool,

    /// xtrabackup `--use-memory` for the prepare step, e.g. "2GB"
    pub use_memory: Option<String>,

    /// xtrabackup binary used by the prepare step
    pub xtrabackup_bin: PathBuf,

    /// Passed as `--defaults-file` to the prepare step when set
    pub defaults_file: Option<PathBuf>,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self {
            workspace_parent: None,
            max_bandwidth: None,
            apply_prepare: false,
            use_memory: None,
            xtrabackup_bin: PathBuf::from("xtrabackup"),
            defaults_file: None,
        }
    }
}

impl RestoreOptions {
    /// Directory the workspace will be created in
    pub fn workspace_parent(&self) -> PathBuf {
        self.workspace_parent
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_bandwidth == Some(0) {
            return Err(ConfigError::Invalid {
                field: "max bandwidth",
                reason: "must be > 0 when set".to_string(),
            });
        }
        if let Some(mem) = &self.use_memory {
            if mem.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field: "use memory",
                    reason: "must not be blank".to_string(),
                });
            }
        }
        Ok(())
    }
}

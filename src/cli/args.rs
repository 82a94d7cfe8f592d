//! CLI argument definitions using clap
//!
//! Commands:
//! - xtralab restore --xtralab-host <host> --db <db> (--from <point> | --latest)
//! - xtralab full-backup --xtralab-host <host> --db <db> --mysql-user <user>
//! - xtralab inc-backup --xtralab-host <host> --db <db> --mysql-user <user>

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand};

use crate::config::{CatalogConfig, MysqlConfig, RestoreOptions, DEFAULT_CATALOG_PORT};

/// xtralab - xtrabackup backups and restores against a backup catalog
#[derive(Parser, Debug)]
#[command(name = "xtralab")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Rebuild a data directory from the catalog's backup chain
    Restore(RestoreArgs),

    /// Take a full backup and upload it
    FullBackup(BackupArgs),

    /// Take an incremental backup from the last recorded LSN and upload it
    IncBackup(BackupArgs),
}

/// Catalog connection flags
#[derive(Args, Debug, Clone)]
pub struct CatalogArgs {
    /// Catalog host
    #[arg(long = "xtralab-host")]
    pub host: String,

    /// Catalog port
    #[arg(long = "xtralab-port", default_value_t = DEFAULT_CATALOG_PORT)]
    pub port: u16,

    /// Timeout for every catalog request, in seconds
    #[arg(long = "timeout", default_value_t = 30)]
    pub timeout_secs: u64,
}

impl CatalogArgs {
    pub fn to_config(&self) -> CatalogConfig {
        CatalogConfig::new(self.host.clone(), self.port)
            .with_timeout(Duration::from_secs(self.timeout_secs))
    }
}

/// xtrabackup binary flags shared by backup and prepare
#[derive(Args, Debug, Clone)]
pub struct XtrabackupArgs {
    /// xtrabackup binary
    #[arg(long, default_value = "xtrabackup")]
    pub xtrabackup_bin: PathBuf,

    /// MySQL option file passed as --defaults-file
    #[arg(long)]
    pub defaults_file: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct RestoreArgs {
    #[command(flatten)]
    pub catalog: CatalogArgs,

    /// Database to restore
    #[arg(long)]
    pub db: String,

    /// Restore point, passed to the catalog as-is
    #[arg(long, required_unless_present = "latest", conflicts_with = "latest")]
    pub from: Option<String>,

    /// Restore as of today (local date)
    #[arg(long)]
    pub latest: bool,

    /// Directory the workspace is created in (default: system temp dir)
    #[arg(long, alias = "data-dir")]
    pub workspace_dir: Option<PathBuf>,

    /// Download limit in bytes per second
    #[arg(long)]
    pub max_bandwidth: Option<u64>,

    /// Run xtrabackup --prepare over the restored chain
    #[arg(long)]
    pub apply_prepare: bool,

    /// xtrabackup --use-memory for the prepare step, e.g. 2GB
    #[arg(long, requires = "apply_prepare")]
    pub use_memory: Option<String>,

    #[command(flatten)]
    pub xtrabackup: XtrabackupArgs,
}

impl RestoreArgs {
    pub fn to_options(&self) -> RestoreOptions {
        RestoreOptions {
            workspace_parent: self.workspace_dir.clone(),
            max_bandwidth: self.max_bandwidth,
            apply_prepare: self.apply_prepare,
            use_memory: self.use_memory.clone(),
            xtrabackup_bin: self.xtrabackup.xtrabackup_bin.clone(),
            defaults_file: self.xtrabackup.defaults_file.clone(),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct BackupArgs {
    #[command(flatten)]
    pub catalog: CatalogArgs,

    /// Database the backup is filed under
    #[arg(long)]
    pub db: String,

    /// MySQL host
    #[arg(long, default_value = "127.0.0.1")]
    pub mysql_host: String,

    /// MySQL port
    #[arg(long, default_value_t = 3306)]
    pub mysql_port: u16,

    /// MySQL user
    #[arg(long)]
    pub mysql_user: String,

    /// MySQL password
    #[arg(long)]
    pub mysql_password: Option<String>,

    /// xtrabackup --parallel
    #[arg(long, default_value_t = 1)]
    pub parallel: u32,

    #[command(flatten)]
    pub xtrabackup: XtrabackupArgs,
}

impl BackupArgs {
    pub fn to_mysql_config(&self) -> MysqlConfig {
        let mut config = MysqlConfig::new(self.mysql_user.clone());
        config.host = self.mysql_host.clone();
        config.port = self.mysql_port;
        config.password = self.mysql_password.clone();
        config.defaults_file = self.xtrabackup.defaults_file.clone();
        config.xtrabackup_bin = self.xtrabackup.xtrabackup_bin.clone();
        config.parallel = self.parallel;
        config
    }
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

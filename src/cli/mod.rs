//! CLI module for xtralab
//!
//! Provides command-line interface for:
//! - restore: Rebuild a data directory from the catalog's backup chain
//! - full-backup: Stream a full xtrabackup into the catalog
//! - inc-backup: Stream an incremental xtrabackup into the catalog

mod args;
mod commands;
mod errors;
mod io;
mod signal;

pub use args::{BackupArgs, CatalogArgs, Cli, Command, RestoreArgs, XtrabackupArgs};
pub use commands::{full_backup, inc_backup, init_logging, restore, restore_point, run, run_command};
pub use errors::{CliError, CliErrorCode, CliResult, EXIT_FAILURE, EXIT_SKIPPED};
pub use io::{write_backup_summary, write_workspace_path};
pub use signal::install_signal_handlers;

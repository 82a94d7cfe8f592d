//! CLI command implementations
//!
//! Each command builds its immutable configuration from flags, validates
//! it, and hands off to the library. Nothing here retries.

use chrono::Local;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use super::args::{BackupArgs, Cli, Command, RestoreArgs};
use super::errors::{CliError, CliResult};
use super::io::{write_backup_summary, write_workspace_path};
use super::signal::install_signal_handlers;
use crate::backup::{BackupOutcome, BackupProducer};
use crate::catalog::HttpCatalog;
use crate::config::ConfigError;
use crate::restore::{RestoreEvent, RestoreManager};

/// Main CLI entry point
///
/// Parses arguments, installs logging and dispatches to the command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    init_logging(cli.verbose);
    run_command(cli.command)
}

/// Install the stderr log subscriber. `RUST_LOG` overrides `-v`.
pub fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Restore(args) => restore(&args),
        Command::FullBackup(args) => full_backup(&args),
        Command::IncBackup(args) => inc_backup(&args),
    }
}

/// Restore point handed to the catalog: `--from` as given, or today's
/// local date for `--latest`.
pub fn restore_point(from: Option<&str>, latest: bool) -> CliResult<String> {
    if latest {
        return Ok(Local::now().format("%Y-%m-%d").to_string());
    }
    match from.map(str::trim) {
        Some(point) if !point.is_empty() => Ok(point.to_string()),
        _ => Err(ConfigError::Missing("restore point (--from or --latest)").into()),
    }
}

/// Rebuild a data directory for `--db` and print the workspace path.
pub fn restore(args: &RestoreArgs) -> CliResult<()> {
    let catalog_config = args.catalog.to_config();
    catalog_config.validate()?;
    let options = args.to_options();
    options.validate()?;
    let from = restore_point(args.from.as_deref(), args.latest)?;

    let catalog = HttpCatalog::new(&catalog_config)?;
    let cancel = install_signal_handlers();

    let mut on_event = |event: RestoreEvent| match event {
        RestoreEvent::WorkspaceCreated { path } => {
            if let Err(e) = write_workspace_path(&path) {
                warn!(error = %e, "could not print workspace path");
            }
        }
        RestoreEvent::ArtifactFetched { role, key, bytes } => {
            debug!(role = %role, key = %key, bytes, "fetched");
        }
        RestoreEvent::ArtifactUnpacked { role, key } => {
            debug!(role = %role, key = %key, "unpacked");
        }
    };

    let workspace = RestoreManager::new(&catalog, &options)
        .with_cancel(cancel)
        .restore_with_progress(&args.db, &from, Some(&mut on_event))?;

    info!(db = %args.db, from = %from, workspace = %workspace.display(), "restore finished");
    Ok(())
}

/// Take and upload a full backup.
pub fn full_backup(args: &BackupArgs) -> CliResult<()> {
    let catalog_config = args.catalog.to_config();
    catalog_config.validate()?;
    let mysql = args.to_mysql_config();
    mysql.validate()?;

    let catalog = HttpCatalog::new(&catalog_config)?;
    let outcome = BackupProducer::new(&catalog, &mysql).full_backup(&args.db)?;
    write_backup_summary(&args.db, "full", &outcome)
}

/// Take and upload an incremental backup; exits with a distinct code when
/// there is no base to increment from.
pub fn inc_backup(args: &BackupArgs) -> CliResult<()> {
    let catalog_config = args.catalog.to_config();
    catalog_config.validate()?;
    let mysql = args.to_mysql_config();
    mysql.validate()?;

    let catalog = HttpCatalog::new(&catalog_config)?;
    let outcome = BackupProducer::new(&catalog, &mysql).incremental_backup(&args.db)?;
    write_backup_summary(&args.db, "incremental", &outcome)?;

    match outcome {
        BackupOutcome::Uploaded { .. } => Ok(()),
        BackupOutcome::Skipped => Err(CliError::backup_skipped(&args.db)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::CliErrorCode;

    #[test]
    fn test_restore_point_from_flag() {
        assert_eq!(restore_point(Some(" 2024-01-01 "), false).unwrap(), "2024-01-01");
    }

    #[test]
    fn test_restore_point_latest_is_today() {
        let point = restore_point(None, true).unwrap();
        assert_eq!(point.len(), 10);
        assert!(chrono::NaiveDate::parse_from_str(&point, "%Y-%m-%d").is_ok());
    }

    #[test]
    fn test_restore_point_missing() {
        let err = restore_point(Some("  "), false).unwrap_err();
        assert_eq!(err.code(), CliErrorCode::ConfigError);
        assert!(restore_point(None, false).is_err());
    }
}

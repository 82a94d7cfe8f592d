//! Output handling for CLI
//!
//! stdout carries only results (the workspace path, backup summaries), one
//! per line; everything else goes to the log on stderr.

use std::io::{self, Write};
use std::path::Path;

use serde_json::json;

use super::errors::CliResult;
use crate::backup::BackupOutcome;

/// Print the workspace path as soon as it exists
pub fn write_workspace_path(path: &Path) -> CliResult<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{}", path.display())?;
    handle.flush()?;
    Ok(())
}

/// Print a one-line JSON summary of a backup run
pub fn write_backup_summary(db: &str, kind: &str, outcome: &BackupOutcome) -> CliResult<()> {
    let summary = match outcome {
        BackupOutcome::Uploaded { bytes } => json!({
            "db": db,
            "kind": kind,
            "uploaded": true,
            "bytes": bytes,
        }),
        BackupOutcome::Skipped => json!({
            "db": db,
            "kind": kind,
            "uploaded": false,
        }),
    };

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{}", summary)?;
    handle.flush()?;
    Ok(())
}

//! Optional xtrabackup prepare step
//!
//! Applies the unpacked chain in place: `base/` first, then `inc1`,
//! `inc2`, ... in ascending order. Every step but the last only replays
//! redo (`--apply-log-only`), so later increments can still be applied.

use std::io;
use std::path::Path;
use std::process::Stdio;

use tracing::info;

use super::errors::{RestoreError, RestoreResult};
use crate::backup::XtrabackupCommand;
use crate::config::RestoreOptions;

/// Named prepare steps for a chain with `increments` increments
pub fn prepare_plan(options: &RestoreOptions, increments: usize) -> Vec<(String, XtrabackupCommand)> {
    let mut steps = Vec::with_capacity(increments + 1);
    steps.push((
        "base".to_string(),
        XtrabackupCommand::prepare_base(options, increments == 0),
    ));
    for n in 1..=increments {
        steps.push((
            format!("inc{}", n),
            XtrabackupCommand::prepare_increment(options, n, n == increments),
        ));
    }
    steps
}

/// Run every prepare step inside `workspace`, stopping at the first failure.
pub fn run_prepare(workspace: &Path, options: &RestoreOptions, increments: usize) -> RestoreResult<()> {
    for (step, cmd) in prepare_plan(options, increments) {
        info!(step = %step, command = %cmd.masked(), "running prepare step");

        let status = cmd
            .to_command()
            .current_dir(workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::from(io::stderr()))
            .stderr(Stdio::inherit())
            .status()
            .map_err(|e| RestoreError::Prepare {
                step: step.clone(),
                reason: format!("failed to run {}: {}", cmd.program().display(), e),
            })?;

        if !status.success() {
            return Err(RestoreError::Prepare {
                step,
                reason: status.to_string(),
            });
        }
    }
    Ok(())
}

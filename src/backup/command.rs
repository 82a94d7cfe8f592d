//! xtrabackup invocations
//!
//! Commands are built as argument vectors and spawned directly, never
//! through a shell. [`XtrabackupCommand::masked`] renders them for logs with
//! the password replaced.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::catalog::Lsn;
use crate::config::{MysqlConfig, RestoreOptions};

const PASSWORD_FLAG: &str = "--password";
const MASK: &str = "***";

/// A fully composed xtrabackup command line
#[derive(Clone, PartialEq, Eq)]
pub struct XtrabackupCommand {
    program: PathBuf,
    args: Vec<String>,
}

impl XtrabackupCommand {
    /// Full backup streamed as tar on stdout
    pub fn full_backup(config: &MysqlConfig) -> Self {
        let mut cmd = Self::backup_base(config);
        cmd.push("--safe-slave-backup");
        cmd.push_pair("--stream", "tar");
        cmd.push_pair("--parallel", config.parallel.to_string());
        cmd
    }

    /// Incremental backup since `lsn`, streamed as xbstream on stdout
    pub fn incremental_backup(config: &MysqlConfig, lsn: &Lsn) -> Self {
        let mut cmd = Self::backup_base(config);
        cmd.push_pair("--stream", "xbstream");
        cmd.push("--safe-slave-backup");
        cmd.push_pair("--incremental-lsn", lsn.as_str());
        cmd.push_pair("--parallel", config.parallel.to_string());
        cmd
    }

    /// Prepare `base/`. Redo is applied only (no rollback) unless this is
    /// the last prepare of the chain.
    pub fn prepare_base(options: &RestoreOptions, is_last: bool) -> Self {
        Self::prepare(options, None, is_last)
    }

    /// Merge `inc<n>/` into `base/`
    pub fn prepare_increment(options: &RestoreOptions, n: usize, is_last: bool) -> Self {
        Self::prepare(options, Some(format!("inc{}", n)), is_last)
    }

    fn backup_base(config: &MysqlConfig) -> Self {
        let mut cmd = Self::new(&config.xtrabackup_bin);
        cmd.push_defaults_file(config.defaults_file.as_deref());
        cmd.push_pair("--host", config.host.as_str());
        cmd.push_pair("--port", config.port.to_string());
        cmd.push_pair("--user", config.user.as_str());
        if let Some(password) = &config.password {
            cmd.push_pair(PASSWORD_FLAG, password.as_str());
        }
        cmd.push("--slave-info");
        cmd.push("--backup");
        cmd
    }

    fn prepare(options: &RestoreOptions, incremental_dir: Option<String>, is_last: bool) -> Self {
        let mut cmd = Self::new(&options.xtrabackup_bin);
        cmd.push_defaults_file(options.defaults_file.as_deref());
        if let Some(mem) = &options.use_memory {
            cmd.push_pair("--use-memory", mem.as_str());
        }
        cmd.push_pair("--target-dir", "base");
        if !is_last {
            cmd.push("--apply-log-only");
        }
        if let Some(dir) = incremental_dir {
            cmd.push_pair("--incremental-dir", dir);
        }
        cmd.push("--prepare");
        cmd
    }

    fn new(program: &Path) -> Self {
        Self {
            program: program.to_path_buf(),
            args: Vec::new(),
        }
    }

    fn push(&mut self, arg: impl Into<String>) {
        self.args.push(arg.into());
    }

    fn push_pair(&mut self, flag: &str, value: impl Into<String>) {
        self.args.push(flag.to_string());
        self.args.push(value.into());
    }

    fn push_defaults_file(&mut self, path: Option<&Path>) {
        // xtrabackup requires this one first and in `--flag=value` form
        if let Some(path) = path {
            self.args
                .push(format!("--defaults-file={}", path.display()));
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Command line with the password masked
    pub fn masked(&self) -> String {
        let mut out = self.program.display().to_string();
        let mut hide_next = false;
        for arg in &self.args {
            out.push(' ');
            if hide_next {
                out.push_str(MASK);
                hide_next = false;
            } else {
                out.push_str(arg);
                hide_next = arg == PASSWORD_FLAG;
            }
        }
        out
    }

    /// A `Command` ready to spawn; stdio is left to the caller
    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

impl fmt::Debug for XtrabackupCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

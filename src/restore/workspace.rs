//! Per-restore workspace directory
//!
//! Layout once a restore completes:
//!
//! ```text
//! xtralab-restore-<uuid>/
//! ├── base/
//! ├── inc1/
//! └── incN/
//! ```
//!
//! Staged artifacts (`base.tar.gz`, `incN.xb.gz`, `incN.xb`) live next to
//! those directories only while they are being processed. The workspace is
//! never removed by this crate.

use std::fs::{self, DirBuilder};
use std::io;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::catalog::ArtifactRole;

/// Name prefix of every workspace directory
pub const WORKSPACE_PREFIX: &str = "xtralab-restore-";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Create a fresh, uniquely named workspace below `parent`.
    ///
    /// Fails rather than reuse an existing directory.
    pub fn create(parent: &Path) -> io::Result<Self> {
        fs::create_dir_all(parent)?;

        let root = parent.join(format!("{}{}", WORKSPACE_PREFIX, Uuid::new_v4().simple()));
        let mut builder = DirBuilder::new();
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }
        builder.create(&root)?;

        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Extraction directory for `role`
    pub fn dir_for(&self, role: ArtifactRole) -> PathBuf {
        self.root.join(role.dir_name())
    }

    /// Where the fetched, compressed artifact for `role` is staged
    pub fn staged_path(&self, role: ArtifactRole) -> PathBuf {
        self.root.join(role.staged_name())
    }

    /// Intermediate xbstream container for increment `n`
    pub fn container_path(&self, n: usize) -> PathBuf {
        self.root.join(format!("inc{}.xb", n))
    }

    pub fn into_path(self) -> PathBuf {
        self.root
    }
}

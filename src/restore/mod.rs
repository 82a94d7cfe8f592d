//! Restore orchestrator
//!
//! Rebuilds an xtrabackup data directory from the catalog's chain for
//! `(db, from)`.
//!
//! # Algorithm
//!
//! 1. Resolve the chain (nothing touches disk before this succeeds)
//! 2. Create a fresh workspace and report its path
//! 3. Fetch and unpack every increment, newest first, into `inc<N>/` with
//!    `N` counting down from `len - 1` to `1`
//! 4. Fetch and unpack the base into `base/`
//! 5. Optionally run the prepare step
//!
//! Artifacts are processed strictly one after another. Cancellation is
//! checked before each artifact. Any failure ends the restore and leaves
//! the workspace as it is; no step is retried.
//!
//! # Important
//!
//! The workspace is never deleted, on success or failure.

mod cancel;
mod errors;
mod prepare;
mod workspace;

pub use cancel::CancelToken;
pub use errors::{RestoreError, RestoreErrorCode, RestoreResult};
pub use prepare::{prepare_plan, run_prepare};
pub use workspace::{Workspace, WORKSPACE_PREFIX};

use std::fs;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::catalog::{ArtifactKey, ArtifactRole, Catalog, Chain, ChainLookup, ChainStep};
use crate::config::RestoreOptions;
use crate::fetch::ArtifactFetcher;
use crate::unpack::{unpack_base, unpack_increment};

/// Progress reported while a restore runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreEvent {
    /// Emitted before any artifact is fetched
    WorkspaceCreated { path: PathBuf },
    ArtifactFetched {
        role: ArtifactRole,
        key: ArtifactKey,
        bytes: u64,
    },
    ArtifactUnpacked { role: ArtifactRole, key: ArtifactKey },
}

fn emit(progress: &mut Option<&mut dyn FnMut(RestoreEvent)>, event: RestoreEvent) {
    if let Some(callback) = progress.as_deref_mut() {
        callback(event);
    }
}

/// Restore manager driving one catalog.
///
/// # Usage
///
/// ```ignore
/// let catalog = HttpCatalog::new(&catalog_config)?;
/// let workspace = RestoreManager::new(&catalog, &options).restore("db1", "2024-01-01")?;
/// ```
pub struct RestoreManager<'a, C: Catalog + ?Sized> {
    catalog: &'a C,
    options: &'a RestoreOptions,
    cancel: CancelToken,
}

impl<'a, C: Catalog + ?Sized> RestoreManager<'a, C> {
    pub fn new(catalog: &'a C, options: &'a RestoreOptions) -> Self {
        Self {
            catalog,
            options,
            cancel: CancelToken::new(),
        }
    }

    /// Observe `token` between artifacts
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Query the catalog for the chain of `(db, from)`.
    pub fn resolve(&self, db: &str, from: &str) -> RestoreResult<Chain> {
        info!(db = %db, from = %from, "resolving chain");

        match self
            .catalog
            .search_chain(db, from)
            .map_err(RestoreError::CatalogUnavailable)?
        {
            ChainLookup::Found(chain) => {
                debug!(
                    db = %db,
                    artifacts = chain.len(),
                    increments = chain.increment_count(),
                    "chain resolved"
                );
                Ok(chain)
            }
            ChainLookup::NotFound => Err(RestoreError::NoChain {
                db: db.to_string(),
                from: from.to_string(),
            }),
        }
    }

    /// Restore `db` as of `from` and return the workspace path.
    pub fn restore(&self, db: &str, from: &str) -> RestoreResult<PathBuf> {
        self.restore_with_progress(db, from, None)
    }

    /// [`restore`](Self::restore), reporting [`RestoreEvent`]s to `progress`.
    pub fn restore_with_progress(
        &self,
        db: &str,
        from: &str,
        mut progress: Option<&mut dyn FnMut(RestoreEvent)>,
    ) -> RestoreResult<PathBuf> {
        self.options.validate()?;

        let chain = self.resolve(db, from)?;

        let parent = self.options.workspace_parent();
        let workspace = Workspace::create(&parent).map_err(|source| RestoreError::Workspace {
            path: parent.clone(),
            source,
        })?;
        info!(workspace = %workspace.path().display(), "workspace created");
        emit(
            &mut progress,
            RestoreEvent::WorkspaceCreated {
                path: workspace.path().to_path_buf(),
            },
        );

        let fetcher =
            ArtifactFetcher::new(self.catalog).with_max_bandwidth(self.options.max_bandwidth);
        let plan = chain.plan();
        let total = plan.len();

        for (completed, step) in plan.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!(completed, total, "restore cancelled");
                return Err(RestoreError::Cancelled { completed, total });
            }
            self.process_step(&workspace, &fetcher, step, &mut progress)?;
        }

        if self.options.apply_prepare {
            if self.cancel.is_cancelled() {
                return Err(RestoreError::Cancelled {
                    completed: total,
                    total,
                });
            }
            run_prepare(workspace.path(), self.options, chain.increment_count())?;
        }

        info!(
            db = %db,
            workspace = %workspace.path().display(),
            artifacts = total,
            "restore complete"
        );
        Ok(workspace.into_path())
    }

    fn process_step(
        &self,
        workspace: &Workspace,
        fetcher: &ArtifactFetcher<'_, C>,
        step: &ChainStep,
        progress: &mut Option<&mut dyn FnMut(RestoreEvent)>,
    ) -> RestoreResult<()> {
        let staged = workspace.staged_path(step.role);

        info!(
            role = %step.role,
            storage_type = %step.key.storage_type,
            key = %step.key.key,
            "fetching artifact"
        );
        let bytes = fetcher.fetch(&step.key, &staged)?;
        emit(
            progress,
            RestoreEvent::ArtifactFetched {
                role: step.role,
                key: step.key.clone(),
                bytes,
            },
        );

        info!(role = %step.role, bytes, "unpacking artifact");
        let dest = workspace.dir_for(step.role);
        let unpacked = match step.role {
            ArtifactRole::Base => unpack_base(&staged, &dest),
            ArtifactRole::Increment(n) => {
                unpack_increment(&staged, &workspace.container_path(n), &dest).map(|_| ())
            }
        };
        unpacked.map_err(|source| RestoreError::Unpack {
            key: step.key.clone(),
            source,
        })?;

        if let Err(e) = fs::remove_file(&staged) {
            warn!(path = %staged.display(), error = %e, "could not remove staged artifact");
        }

        emit(
            progress,
            RestoreEvent::ArtifactUnpacked {
                role: step.role,
                key: step.key.clone(),
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;
    use crate::unpack::XbstreamWriter;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::TempDir;

    fn gzip(bytes: &[u8]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::fast());
        enc.write_all(bytes).unwrap();
        enc.finish().unwrap()
    }

    fn base_artifact(marker: &[u8]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_size(marker.len() as u64);
        header.set_mode(0o640);
        header.set_cksum();
        builder.append_data(&mut header, "ibdata1", marker).unwrap();
        gzip(&builder.into_inner().unwrap())
    }

    fn inc_artifact(marker: &[u8]) -> Vec<u8> {
        let mut w = XbstreamWriter::new(Vec::new());
        w.add_file("ibdata1.delta", marker).unwrap();
        gzip(&w.finish().unwrap())
    }

    fn options(parent: &TempDir) -> RestoreOptions {
        RestoreOptions {
            workspace_parent: Some(parent.path().to_path_buf()),
            ..Default::default()
        }
    }

    #[test]
    fn test_restore_three_element_chain() {
        let temp = TempDir::new().unwrap();
        let k3 = ArtifactKey::new("local", "k3");
        let k2 = ArtifactKey::new("local", "k2");
        let k1 = ArtifactKey::new("local", "k1");
        let catalog = MemoryCatalog::new()
            .with_chain("db1", "2024-01-03", vec![k3.clone(), k2.clone(), k1.clone()])
            .with_artifact(k3.clone(), inc_artifact(b"k3"))
            .with_artifact(k2.clone(), inc_artifact(b"k2"))
            .with_artifact(k1.clone(), base_artifact(b"k1"));
        let options = options(&temp);

        let ws = RestoreManager::new(&catalog, &options)
            .restore("db1", "2024-01-03")
            .unwrap();

        assert_eq!(fs::read(ws.join("inc2/ibdata1.delta")).unwrap(), b"k3");
        assert_eq!(fs::read(ws.join("inc1/ibdata1.delta")).unwrap(), b"k2");
        assert_eq!(fs::read(ws.join("base/ibdata1")).unwrap(), b"k1");
        assert_eq!(catalog.fetched(), vec![k3, k2, k1]);

        let mut entries: Vec<String> = fs::read_dir(&ws)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        entries.sort();
        assert_eq!(entries, vec!["base", "inc1", "inc2"]);
    }

    #[test]
    fn test_no_chain_creates_no_workspace() {
        let temp = TempDir::new().unwrap();
        let catalog = MemoryCatalog::new();
        let options = options(&temp);

        let err = RestoreManager::new(&catalog, &options)
            .restore("db1", "2024-01-01")
            .unwrap_err();

        assert_eq!(err.code(), RestoreErrorCode::NoChain);
        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_catalog_down_is_catalog_unavailable() {
        let temp = TempDir::new().unwrap();
        let catalog = MemoryCatalog::new().offline();
        let options = options(&temp);

        let err = RestoreManager::new(&catalog, &options)
            .restore("db1", "2024-01-01")
            .unwrap_err();

        assert_eq!(err.code(), RestoreErrorCode::CatalogUnavailable);
        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_cancelled_before_first_artifact() {
        let temp = TempDir::new().unwrap();
        let k1 = ArtifactKey::new("local", "k1");
        let catalog = MemoryCatalog::new()
            .with_chain("db1", "p", vec![k1.clone()])
            .with_artifact(k1, base_artifact(b"k1"));
        let options = options(&temp);
        let token = CancelToken::new();
        token.cancel();

        let err = RestoreManager::new(&catalog, &options)
            .with_cancel(token)
            .restore("db1", "p")
            .unwrap_err();

        assert!(matches!(
            err,
            RestoreError::Cancelled {
                completed: 0,
                total: 1
            }
        ));
        assert!(catalog.fetched().is_empty());
    }

    #[test]
    fn test_cancel_from_progress_stops_after_current_artifact() {
        let temp = TempDir::new().unwrap();
        let k2 = ArtifactKey::new("local", "k2");
        let k1 = ArtifactKey::new("local", "k1");
        let catalog = MemoryCatalog::new()
            .with_chain("db1", "p", vec![k2.clone(), k1.clone()])
            .with_artifact(k2.clone(), inc_artifact(b"k2"))
            .with_artifact(k1, base_artifact(b"k1"));
        let options = options(&temp);
        let token = CancelToken::new();
        let trigger = token.clone();

        let mut workspace = None;
        let mut on_event = |event: RestoreEvent| match event {
            RestoreEvent::WorkspaceCreated { path } => workspace = Some(path),
            RestoreEvent::ArtifactUnpacked { .. } => trigger.cancel(),
            RestoreEvent::ArtifactFetched { .. } => {}
        };

        let err = RestoreManager::new(&catalog, &options)
            .with_cancel(token)
            .restore_with_progress("db1", "p", Some(&mut on_event))
            .unwrap_err();

        assert!(matches!(err, RestoreError::Cancelled { completed: 1, .. }));
        assert_eq!(catalog.fetched(), vec![k2]);
        let ws = workspace.unwrap();
        assert!(ws.join("inc1/ibdata1.delta").exists());
        assert!(!ws.join("base").exists());
    }

    #[test]
    fn test_progress_events_in_order() {
        let temp = TempDir::new().unwrap();
        let k2 = ArtifactKey::new("local", "k2");
        let k1 = ArtifactKey::new("local", "k1");
        let inc = inc_artifact(b"k2");
        let inc_len = inc.len() as u64;
        let catalog = MemoryCatalog::new()
            .with_chain("db1", "p", vec![k2.clone(), k1.clone()])
            .with_artifact(k2.clone(), inc)
            .with_artifact(k1.clone(), base_artifact(b"k1"));
        let options = options(&temp);

        let mut events = Vec::new();
        let mut record = |e: RestoreEvent| events.push(e);
        let ws = RestoreManager::new(&catalog, &options)
            .restore_with_progress("db1", "p", Some(&mut record))
            .unwrap();

        assert_eq!(events.len(), 5);
        assert_eq!(events[0], RestoreEvent::WorkspaceCreated { path: ws });
        assert_eq!(
            events[1],
            RestoreEvent::ArtifactFetched {
                role: ArtifactRole::Increment(1),
                key: k2.clone(),
                bytes: inc_len,
            }
        );
        assert_eq!(
            events[2],
            RestoreEvent::ArtifactUnpacked {
                role: ArtifactRole::Increment(1),
                key: k2,
            }
        );
        assert!(matches!(
            events[4],
            RestoreEvent::ArtifactUnpacked {
                role: ArtifactRole::Base,
                ..
            }
        ));
    }

    #[test]
    fn test_invalid_options_rejected_before_catalog() {
        let catalog = MemoryCatalog::new();
        let options = RestoreOptions {
            max_bandwidth: Some(0),
            ..Default::default()
        };

        let err = RestoreManager::new(&catalog, &options)
            .restore("db1", "p")
            .unwrap_err();
        assert_eq!(err.code(), RestoreErrorCode::Config);
    }
}

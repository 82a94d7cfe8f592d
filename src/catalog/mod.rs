//! Backup catalog ("lab") model and clients
//!
//! The catalog stores every artifact produced by a backup run and answers
//! three questions for the restore side:
//!
//! - which artifacts make up the chain for `(db, point)`
//! - what the last recorded LSN of a database is
//! - the raw bytes of one artifact
//!
//! # Chain order
//!
//! The catalog returns keys newest-first. The last key is always the full
//! base; every key before it is an increment:
//!
//! ```text
//! [ inc(newest), ..., inc(oldest), base ]
//! ```
//!
//! [`Chain::plan`] turns that list into the processing order used by the
//! restore orchestrator, numbering increments so that `inc1` is the oldest.

mod errors;
mod http;
mod memory;

pub use errors::{CatalogError, CatalogResult};
pub use http::HttpCatalog;
pub use memory::MemoryCatalog;

use std::fmt;
use std::io::Read;

use serde::{Deserialize, Serialize};

/// Storage backend holding an artifact's bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StorageType {
    /// Local disk of the catalog host
    Local,
    /// Any backend this client has no special knowledge of
    Other(String),
}

impl StorageType {
    /// Wire name used in catalog URLs and JSON
    pub fn as_str(&self) -> &str {
        match self {
            StorageType::Local => "local",
            StorageType::Other(name) => name,
        }
    }
}

impl From<String> for StorageType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "local" => StorageType::Local,
            _ => StorageType::Other(s),
        }
    }
}

impl From<&str> for StorageType {
    fn from(s: &str) -> Self {
        StorageType::from(s.to_string())
    }
}

impl From<StorageType> for String {
    fn from(t: StorageType) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one stored backup artifact
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactKey {
    pub storage_type: StorageType,
    pub key: String,
}

impl ArtifactKey {
    pub fn new(storage_type: impl Into<StorageType>, key: impl Into<String>) -> Self {
        Self {
            storage_type: storage_type.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.storage_type, self.key)
    }
}

/// Role of an artifact within a restore chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactRole {
    /// The full backup every increment applies on top of
    Base,
    /// An increment; `1` is the oldest and is applied first
    Increment(usize),
}

impl ArtifactRole {
    /// Directory inside the workspace the artifact is extracted into
    pub fn dir_name(&self) -> String {
        match self {
            ArtifactRole::Base => "base".to_string(),
            ArtifactRole::Increment(n) => format!("inc{}", n),
        }
    }

    /// File name of the fetched, still-compressed artifact
    pub fn staged_name(&self) -> String {
        match self {
            ArtifactRole::Base => "base.tar.gz".to_string(),
            ArtifactRole::Increment(n) => format!("inc{}.xb.gz", n),
        }
    }
}

impl fmt::Display for ArtifactRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dir_name())
    }
}

/// One unit of restore work: an artifact and where it goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainStep {
    pub role: ArtifactRole,
    pub key: ArtifactKey,
}

/// Non-empty, newest-first list of artifacts needed for a restore
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain {
    keys: Vec<ArtifactKey>,
}

impl Chain {
    /// Build a chain from catalog order. Returns `None` for an empty list.
    pub fn from_keys(keys: Vec<ArtifactKey>) -> Option<Self> {
        if keys.is_empty() {
            None
        } else {
            Some(Self { keys })
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Always false; kept for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Number of increments (`len - 1`)
    pub fn increment_count(&self) -> usize {
        self.keys.len() - 1
    }

    /// The full base (last element)
    pub fn base(&self) -> &ArtifactKey {
        &self.keys[self.keys.len() - 1]
    }

    /// Keys in catalog order
    pub fn keys(&self) -> &[ArtifactKey] {
        &self.keys
    }

    /// Processing order for a restore.
    ///
    /// Increments come first in list order (newest first), numbered from
    /// `len - 1` down to `1`; the base is always last. Replaying `inc1`,
    /// `inc2`, ... in ascending order applies them oldest to newest.
    pub fn plan(&self) -> Vec<ChainStep> {
        let n = self.increment_count();
        let mut steps: Vec<ChainStep> = self.keys[..n]
            .iter()
            .enumerate()
            .map(|(idx, key)| ChainStep {
                role: ArtifactRole::Increment(n - idx),
                key: key.clone(),
            })
            .collect();
        steps.push(ChainStep {
            role: ArtifactRole::Base,
            key: self.base().clone(),
        });
        steps
    }
}

/// Result of a chain query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainLookup {
    Found(Chain),
    /// The catalog has no eligible backups for the query
    NotFound,
}

/// InnoDB log sequence number, kept as the catalog reports it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Lsn(String);

impl Lsn {
    /// Returns `None` for an empty or blank value
    pub fn parse(s: &str) -> Option<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of a last-LSN query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LsnLookup {
    Found(Lsn),
    /// No base backup exists yet, so there is nothing to increment from
    Unavailable,
}

/// Open byte stream of a single artifact
pub struct ArtifactStream {
    pub reader: Box<dyn Read + Send>,
    /// Length announced by the catalog, used to detect truncation
    pub expected_len: Option<u64>,
}

impl fmt::Debug for ArtifactStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactStream")
            .field("expected_len", &self.expected_len)
            .finish_non_exhaustive()
    }
}

/// Read side of the catalog
pub trait Catalog {
    /// Artifacts needed to restore `db` as of `from` (opaque to the client)
    fn search_chain(&self, db: &str, from: &str) -> CatalogResult<ChainLookup>;

    /// Last LSN recorded for `db`
    fn last_lsn(&self, db: &str) -> CatalogResult<LsnLookup>;

    /// Open the raw (compressed) bytes of one artifact
    fn open_artifact(&self, key: &ArtifactKey) -> CatalogResult<ArtifactStream>;
}

/// Where a backup stream is ingested
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestTarget {
    /// Gzip-compressed tar stream of a full backup
    Full { db: String },
    /// Gzip-compressed xbstream of an incremental backup starting at `lsn`
    Incremental { db: String, lsn: Lsn },
}

impl IngestTarget {
    pub fn db(&self) -> &str {
        match self {
            IngestTarget::Full { db } | IngestTarget::Incremental { db, .. } => db,
        }
    }

    /// URL path segments below the catalog root
    pub fn path_segments(&self) -> Vec<&str> {
        match self {
            IngestTarget::Full { db } => vec!["api", "full-backup", db.as_str()],
            IngestTarget::Incremental { db, lsn } => {
                vec!["api", db.as_str(), "inc-backup", lsn.as_str()]
            }
        }
    }
}

/// Write side of the catalog
pub trait IngestSink {
    /// Stream `body` to the catalog. Returns once the catalog accepted it.
    fn ingest(&self, target: &IngestTarget, body: &mut dyn Read) -> CatalogResult<()>;
}

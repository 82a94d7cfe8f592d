//! In-process catalog
//!
//! Serves canned chains, LSNs and artifact bytes, and records what was
//! fetched and ingested. Used by tests and by anything that needs to drive
//! the restore pipeline without a running catalog.

use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Read};
use std::sync::Mutex;

use super::errors::{CatalogError, CatalogResult};
use super::{
    ArtifactKey, ArtifactStream, Catalog, Chain, ChainLookup, IngestSink, IngestTarget, Lsn,
    LsnLookup,
};

/// In-memory catalog. Thread-safe via Mutex.
#[derive(Default)]
pub struct MemoryCatalog {
    chains: HashMap<(String, String), Vec<ArtifactKey>>,
    lsns: HashMap<String, String>,
    artifacts: HashMap<ArtifactKey, Vec<u8>>,
    announced_len: HashMap<ArtifactKey, u64>,
    broken: HashSet<ArtifactKey>,
    offline: bool,
    fetched: Mutex<Vec<ArtifactKey>>,
    ingested: Mutex<Vec<(IngestTarget, Vec<u8>)>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the newest-first key list returned for `(db, from)`
    pub fn with_chain(mut self, db: &str, from: &str, keys: Vec<ArtifactKey>) -> Self {
        self.chains.insert((db.to_string(), from.to_string()), keys);
        self
    }

    pub fn with_artifact(mut self, key: ArtifactKey, bytes: Vec<u8>) -> Self {
        self.artifacts.insert(key, bytes);
        self
    }

    /// Serve `bytes` but announce `announced_len` as the length, simulating
    /// a connection that drops mid-body.
    pub fn with_truncated_artifact(
        mut self,
        key: ArtifactKey,
        bytes: Vec<u8>,
        announced_len: u64,
    ) -> Self {
        self.announced_len.insert(key.clone(), announced_len);
        self.artifacts.insert(key, bytes);
        self
    }

    /// Fail every fetch of `key` with HTTP 500
    pub fn with_broken_artifact(mut self, key: ArtifactKey) -> Self {
        self.broken.insert(key);
        self
    }

    pub fn with_last_lsn(mut self, db: &str, lsn: &str) -> Self {
        self.lsns.insert(db.to_string(), lsn.to_string());
        self
    }

    /// Every request fails as if the catalog were unreachable
    pub fn offline(mut self) -> Self {
        self.offline = true;
        self
    }

    /// Keys opened so far, in request order
    pub fn fetched(&self) -> Vec<ArtifactKey> {
        self.fetched
            .lock()
            .map(|f| f.clone())
            .unwrap_or_default()
    }

    /// Uploads accepted so far, in request order
    pub fn ingested(&self) -> Vec<(IngestTarget, Vec<u8>)> {
        self.ingested
            .lock()
            .map(|i| i.clone())
            .unwrap_or_default()
    }

    fn check_online(&self, what: &str) -> CatalogResult<()> {
        if self.offline {
            return Err(CatalogError::Transport {
                url: format!("memory://{}", what),
                message: "connection refused".to_string(),
            });
        }
        Ok(())
    }
}

impl Catalog for MemoryCatalog {
    fn search_chain(&self, db: &str, from: &str) -> CatalogResult<ChainLookup> {
        self.check_online("search")?;

        let keys = self
            .chains
            .get(&(db.to_string(), from.to_string()))
            .cloned()
            .unwrap_or_default();

        Ok(match Chain::from_keys(keys) {
            Some(chain) => ChainLookup::Found(chain),
            None => ChainLookup::NotFound,
        })
    }

    fn last_lsn(&self, db: &str) -> CatalogResult<LsnLookup> {
        self.check_online("last-lsn")?;

        Ok(self
            .lsns
            .get(db)
            .and_then(|lsn| Lsn::parse(lsn))
            .map(LsnLookup::Found)
            .unwrap_or(LsnLookup::Unavailable))
    }

    fn open_artifact(&self, key: &ArtifactKey) -> CatalogResult<ArtifactStream> {
        self.check_online("file")?;

        if let Ok(mut fetched) = self.fetched.lock() {
            fetched.push(key.clone());
        }

        if self.broken.contains(key) {
            return Err(CatalogError::Status {
                url: format!("memory://file/{}", key),
                status: 500,
            });
        }

        let bytes = self
            .artifacts
            .get(key)
            .cloned()
            .ok_or_else(|| CatalogError::ArtifactNotFound(key.to_string()))?;

        let expected_len = self
            .announced_len
            .get(key)
            .copied()
            .unwrap_or(bytes.len() as u64);

        Ok(ArtifactStream {
            reader: Box::new(Cursor::new(bytes)),
            expected_len: Some(expected_len),
        })
    }
}

impl IngestSink for MemoryCatalog {
    fn ingest(&self, target: &IngestTarget, body: &mut dyn Read) -> CatalogResult<()> {
        self.check_online("ingest")?;

        let mut bytes = Vec::new();
        body.read_to_end(&mut bytes)
            .map_err(|e| CatalogError::Transport {
                url: format!("memory://ingest/{}", target.db()),
                message: e.to_string(),
            })?;

        if let Ok(mut ingested) = self.ingested.lock() {
            ingested.push((target.clone(), bytes));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_query_is_not_found() {
        let catalog = MemoryCatalog::new();
        assert_eq!(
            catalog.search_chain("db1", "2024-01-01").unwrap(),
            ChainLookup::NotFound
        );
    }

    #[test]
    fn test_offline_catalog_fails_every_call() {
        let catalog = MemoryCatalog::new().offline();
        assert!(catalog.search_chain("db1", "x").is_err());
        assert!(catalog.last_lsn("db1").is_err());
        assert!(catalog
            .open_artifact(&ArtifactKey::new("local", "k"))
            .is_err());
    }

    #[test]
    fn test_blank_lsn_is_unavailable() {
        let catalog = MemoryCatalog::new().with_last_lsn("db1", "");
        assert_eq!(catalog.last_lsn("db1").unwrap(), LsnLookup::Unavailable);
        assert_eq!(catalog.last_lsn("db2").unwrap(), LsnLookup::Unavailable);
    }

    #[test]
    fn test_fetches_are_recorded() {
        let key = ArtifactKey::new("local", "k1");
        let catalog = MemoryCatalog::new().with_artifact(key.clone(), b"abc".to_vec());

        let mut stream = catalog.open_artifact(&key).unwrap();
        let mut buf = Vec::new();
        stream.reader.read_to_end(&mut buf).unwrap();

        assert_eq!(buf, b"abc");
        assert_eq!(stream.expected_len, Some(3));
        assert_eq!(catalog.fetched(), vec![key]);
    }

    #[test]
    fn test_ingest_collects_body() {
        let catalog = MemoryCatalog::new();
        let target = IngestTarget::Full {
            db: "db1".to_string(),
        };
        catalog
            .ingest(&target, &mut Cursor::new(b"payload".to_vec()))
            .unwrap();

        assert_eq!(catalog.ingested(), vec![(target, b"payload".to_vec())]);
    }
}

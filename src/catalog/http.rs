//! HTTP client for the catalog service
//!
//! Endpoints:
//!
//! ```text
//! GET  /api/restore/search/{db}/{from}      -> {"keys": [{storage_type, key}, ...]}
//! GET  /api/{db}/last-lsn                   -> {"last_lsn": "..."}
//! GET  /api/restore/file/{storage}?key=...  -> raw artifact bytes
//! POST /api/full-backup/{db}                <- gzip(tar)
//! POST /api/{db}/inc-backup/{lsn}           <- gzip(xbstream)
//! ```
//!
//! Every request is bounded by the configured timeout. Non-2xx responses
//! are errors; no request is retried.

use std::io::Read;

use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::errors::{CatalogError, CatalogResult};
use super::{
    ArtifactKey, ArtifactStream, Catalog, Chain, ChainLookup, IngestSink, IngestTarget, Lsn,
    LsnLookup,
};
use crate::config::CatalogConfig;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    keys: Option<Vec<ArtifactKey>>,
}

#[derive(Debug, Deserialize)]
struct LastLsnResponse {
    #[serde(default)]
    last_lsn: String,
}

/// Catalog reached over plain HTTP
pub struct HttpCatalog {
    base: Url,
    agent: ureq::Agent,
}

impl HttpCatalog {
    pub fn new(config: &CatalogConfig) -> CatalogResult<Self> {
        let base_url = config.base_url();
        let base = Url::parse(&base_url)
            .map_err(|e| CatalogError::InvalidEndpoint(format!("{}: {}", base_url, e)))?;

        let agent = ureq::AgentBuilder::new()
            .timeout_connect(config.timeout)
            .timeout_read(config.timeout)
            .timeout_write(config.timeout)
            .build();

        Ok(Self { base, agent })
    }

    /// Build an endpoint URL; each segment is percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> CatalogResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| CatalogError::InvalidEndpoint(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn get(&self, url: &Url) -> CatalogResult<ureq::Response> {
        debug!(url = %url, "catalog GET");
        self.agent
            .request_url("GET", url)
            .call()
            .map_err(|e| map_ureq_error(url, e))
    }
}

fn map_ureq_error(url: &Url, err: ureq::Error) -> CatalogError {
    match err {
        ureq::Error::Status(status, _) => CatalogError::Status {
            url: url.to_string(),
            status,
        },
        ureq::Error::Transport(transport) => CatalogError::Transport {
            url: url.to_string(),
            message: transport.to_string(),
        },
    }
}

fn content_length(resp: &ureq::Response) -> Option<u64> {
    resp.header("Content-Length")
        .and_then(|v| v.trim().parse::<u64>().ok())
}

impl Catalog for HttpCatalog {
    fn search_chain(&self, db: &str, from: &str) -> CatalogResult<ChainLookup> {
        let url = self.endpoint(&["api", "restore", "search", db, from])?;
        let resp = self.get(&url)?;

        let body: SearchResponse =
            serde_json::from_reader(resp.into_reader()).map_err(|e| CatalogError::Malformed {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        Ok(match Chain::from_keys(body.keys.unwrap_or_default()) {
            Some(chain) => ChainLookup::Found(chain),
            None => ChainLookup::NotFound,
        })
    }

    fn last_lsn(&self, db: &str) -> CatalogResult<LsnLookup> {
        let url = self.endpoint(&["api", db, "last-lsn"])?;
        let resp = match self.get(&url) {
            Ok(resp) => resp,
            // No base backup recorded for this database yet
            Err(CatalogError::Status { status: 404, .. }) => return Ok(LsnLookup::Unavailable),
            Err(e) => return Err(e),
        };

        let body: LastLsnResponse =
            serde_json::from_reader(resp.into_reader()).map_err(|e| CatalogError::Malformed {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        Ok(Lsn::parse(&body.last_lsn)
            .map(LsnLookup::Found)
            .unwrap_or(LsnLookup::Unavailable))
    }

    fn open_artifact(&self, key: &ArtifactKey) -> CatalogResult<ArtifactStream> {
        let mut url = self.endpoint(&["api", "restore", "file", key.storage_type.as_str()])?;
        url.query_pairs_mut().append_pair("key", &key.key);

        let resp = self.get(&url)?;
        let expected_len = content_length(&resp);

        Ok(ArtifactStream {
            reader: resp.into_reader(),
            expected_len,
        })
    }
}

impl IngestSink for HttpCatalog {
    fn ingest(&self, target: &IngestTarget, body: &mut dyn Read) -> CatalogResult<()> {
        let url = self.endpoint(&target.path_segments())?;
        debug!(url = %url, "catalog POST");

        let resp = self
            .agent
            .request_url("POST", &url)
            .set("Content-Type", "application/octet-stream")
            .send(body)
            .map_err(|e| map_ureq_error(&url, e))?;

        debug!(url = %url, status = resp.status(), "catalog accepted upload");
        Ok(())
    }
}

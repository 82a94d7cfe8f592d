//! HTTP catalog contract tests
//!
//! Runs a small axum catalog on a loopback port and drives it with the
//! blocking client, the same way the CLI does.

mod common;

use std::collections::HashMap;
use std::io::{Cursor, Read, Write};
use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tempfile::TempDir;

use xtralab::catalog::{
    ArtifactKey, Catalog, CatalogError, ChainLookup, HttpCatalog, IngestSink, IngestTarget, Lsn,
    LsnLookup,
};
use xtralab::config::{CatalogConfig, RestoreOptions};
use xtralab::fetch::{ArtifactFetcher, FetchError};
use xtralab::restore::{RestoreErrorCode, RestoreManager};

use common::{base_artifact, entries, inc_artifact};

#[derive(Default)]
struct Lab {
    chains: HashMap<(String, String), Value>,
    lsns: HashMap<String, String>,
    files: HashMap<(String, String), Vec<u8>>,
    ingested: Mutex<Vec<(String, Vec<u8>)>>,
}

async fn search(
    State(lab): State<Arc<Lab>>,
    Path((db, from)): Path<(String, String)>,
) -> Response {
    match db.as_str() {
        "broken" => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        "slow" => tokio::time::sleep(Duration::from_secs(3)).await,
        _ => {}
    }
    match lab.chains.get(&(db, from)) {
        Some(body) => Json(body.clone()).into_response(),
        None => Json(json!({ "keys": [] })).into_response(),
    }
}

async fn last_lsn(State(lab): State<Arc<Lab>>, Path(db): Path<String>) -> Response {
    match lab.lsns.get(&db) {
        Some(lsn) => Json(json!({ "last_lsn": lsn })).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn file(
    State(lab): State<Arc<Lab>>,
    Path(storage): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let key = query.get("key").cloned().unwrap_or_default();
    match lab.files.get(&(storage, key)) {
        Some(bytes) => bytes.clone().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn ingest_full(
    State(lab): State<Arc<Lab>>,
    Path(db): Path<String>,
    body: Bytes,
) -> StatusCode {
    if db == "readonly" {
        return StatusCode::FORBIDDEN;
    }
    lab.ingested
        .lock()
        .unwrap()
        .push((format!("full/{}", db), body.to_vec()));
    StatusCode::OK
}

async fn ingest_inc(
    State(lab): State<Arc<Lab>>,
    Path((db, lsn)): Path<(String, String)>,
    body: Bytes,
) -> StatusCode {
    lab.ingested
        .lock()
        .unwrap()
        .push((format!("inc/{}/{}", db, lsn), body.to_vec()));
    StatusCode::OK
}

struct TestServer {
    addr: SocketAddr,
    lab: Arc<Lab>,
    _runtime: tokio::runtime::Runtime,
}

impl TestServer {
    fn start(lab: Lab) -> Self {
        let lab = Arc::new(lab);
        let router = Router::new()
            .route("/api/restore/search/:db/:from", get(search))
            .route("/api/restore/file/:storage", get(file))
            .route("/api/full-backup/:db", post(ingest_full))
            .route("/api/:db/last-lsn", get(last_lsn))
            .route("/api/:db/inc-backup/:lsn", post(ingest_inc))
            .with_state(lab.clone());

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();
        let listener = runtime
            .block_on(tokio::net::TcpListener::bind("127.0.0.1:0"))
            .unwrap();
        let addr = listener.local_addr().unwrap();
        runtime.spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            addr,
            lab,
            _runtime: runtime,
        }
    }

    fn config(&self) -> CatalogConfig {
        CatalogConfig::new(self.addr.ip().to_string(), self.addr.port())
            .with_timeout(Duration::from_secs(1))
    }

    fn client(&self) -> HttpCatalog {
        HttpCatalog::new(&self.config()).unwrap()
    }

    fn ingested(&self) -> Vec<(String, Vec<u8>)> {
        self.lab.ingested.lock().unwrap().clone()
    }
}

/// Raw listener that answers the first request with `response` and then
/// holds the connection open without sending anything more.
fn stalling_server(response: &'static [u8]) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            let mut buf = [0u8; 4096];
            let _ = stream.read(&mut buf);
            let _ = stream.write_all(response);
            let _ = stream.flush();
            thread::sleep(Duration::from_secs(5));
        }
    });
    addr
}

fn stalling_client(addr: SocketAddr) -> HttpCatalog {
    let config = CatalogConfig::new(addr.ip().to_string(), addr.port())
        .with_timeout(Duration::from_secs(1));
    HttpCatalog::new(&config).unwrap()
}

fn keys_json(keys: &[(&str, &str)]) -> Value {
    let keys: Vec<Value> = keys
        .iter()
        .map(|(t, k)| json!({ "storage_type": t, "key": k }))
        .collect();
    json!({ "keys": keys })
}

#[test]
fn test_search_preserves_catalog_order() {
    let mut lab = Lab::default();
    lab.chains.insert(
        ("db1".into(), "2024-01-03".into()),
        keys_json(&[("local", "k3"), ("local", "k2"), ("local", "k1")]),
    );
    let server = TestServer::start(lab);

    match server.client().search_chain("db1", "2024-01-03").unwrap() {
        ChainLookup::Found(chain) => {
            let keys: Vec<&str> = chain.keys().iter().map(|k| k.key.as_str()).collect();
            assert_eq!(keys, vec!["k3", "k2", "k1"]);
            assert_eq!(chain.base().key, "k1");
        }
        ChainLookup::NotFound => panic!("expected a chain"),
    }
}

#[test]
fn test_search_empty_and_null_are_not_found() {
    let mut lab = Lab::default();
    lab.chains
        .insert(("db1".into(), "null".into()), json!({ "keys": null }));
    let server = TestServer::start(lab);
    let client = server.client();

    assert_eq!(client.search_chain("db1", "none").unwrap(), ChainLookup::NotFound);
    assert_eq!(client.search_chain("db1", "null").unwrap(), ChainLookup::NotFound);
}

#[test]
fn test_search_non_2xx_is_status_error() {
    let server = TestServer::start(Lab::default());

    let err = server.client().search_chain("broken", "p").unwrap_err();
    assert_eq!(err.status(), Some(500));
}

#[test]
fn test_slow_catalog_times_out_as_transport_error() {
    let server = TestServer::start(Lab::default());

    let err = server.client().search_chain("slow", "p").unwrap_err();
    assert!(matches!(err, CatalogError::Transport { .. }), "{:?}", err);
}

#[test]
fn test_last_lsn_lookup() {
    let mut lab = Lab::default();
    lab.lsns.insert("db1".into(), "1626007".into());
    lab.lsns.insert("blank".into(), "".into());
    let server = TestServer::start(lab);
    let client = server.client();

    assert_eq!(
        client.last_lsn("db1").unwrap(),
        LsnLookup::Found(Lsn::parse("1626007").unwrap())
    );
    assert_eq!(client.last_lsn("blank").unwrap(), LsnLookup::Unavailable);
    assert_eq!(client.last_lsn("unknown").unwrap(), LsnLookup::Unavailable);
}

#[test]
fn test_open_artifact_encodes_key() {
    let key = "db1/2024-01-02 10:00/base.tar.gz?x=1&y";
    let mut lab = Lab::default();
    lab.files
        .insert(("local".into(), key.into()), b"artifact bytes".to_vec());
    let server = TestServer::start(lab);

    let mut stream = server
        .client()
        .open_artifact(&ArtifactKey::new("local", key))
        .unwrap();
    let mut body = Vec::new();
    stream.reader.read_to_end(&mut body).unwrap();

    assert_eq!(body, b"artifact bytes");
    assert_eq!(stream.expected_len, Some(14));
}

#[test]
fn test_open_missing_artifact_is_404() {
    let server = TestServer::start(Lab::default());

    let err = server
        .client()
        .open_artifact(&ArtifactKey::new("local", "nope"))
        .unwrap_err();
    assert_eq!(err.status(), Some(404));
}

#[test]
fn test_ingest_posts_body_to_endpoint() {
    let server = TestServer::start(Lab::default());
    let client = server.client();

    client
        .ingest(
            &IngestTarget::Full { db: "db1".into() },
            &mut Cursor::new(b"full stream".to_vec()),
        )
        .unwrap();
    client
        .ingest(
            &IngestTarget::Incremental {
                db: "db1".into(),
                lsn: Lsn::parse("120").unwrap(),
            },
            &mut Cursor::new(b"inc stream".to_vec()),
        )
        .unwrap();

    assert_eq!(
        server.ingested(),
        vec![
            ("full/db1".to_string(), b"full stream".to_vec()),
            ("inc/db1/120".to_string(), b"inc stream".to_vec()),
        ]
    );
}

#[test]
fn test_ingest_rejected_is_error() {
    let server = TestServer::start(Lab::default());

    let err = server
        .client()
        .ingest(
            &IngestTarget::Full {
                db: "readonly".into(),
            },
            &mut Cursor::new(b"x".to_vec()),
        )
        .unwrap_err();
    assert_eq!(err.status(), Some(403));
}

#[test]
fn test_restore_over_http() {
    let mut lab = Lab::default();
    lab.chains.insert(
        ("db1".into(), "2024-01-03".into()),
        keys_json(&[("local", "db1/k2"), ("local", "db1/k1")]),
    );
    lab.files
        .insert(("local".into(), "db1/k2".into()), inc_artifact("k2"));
    lab.files
        .insert(("local".into(), "db1/k1".into()), base_artifact("k1"));
    let server = TestServer::start(lab);
    let client = server.client();

    let temp = TempDir::new().unwrap();
    let options = RestoreOptions {
        workspace_parent: Some(temp.path().to_path_buf()),
        ..Default::default()
    };
    let ws = RestoreManager::new(&client, &options)
        .restore("db1", "2024-01-03")
        .unwrap();

    assert_eq!(entries(&ws), vec!["base", "inc1"]);
    assert_eq!(
        std::fs::read_to_string(ws.join("inc1/ibdata1.delta")).unwrap(),
        "delta of k2"
    );
}

#[test]
fn test_restore_against_failing_catalog_is_catalog_unavailable() {
    let server = TestServer::start(Lab::default());
    let client = server.client();

    let temp = TempDir::new().unwrap();
    let options = RestoreOptions {
        workspace_parent: Some(temp.path().to_path_buf()),
        ..Default::default()
    };
    let err = RestoreManager::new(&client, &options)
        .restore("broken", "p")
        .unwrap_err();

    assert_eq!(err.code(), RestoreErrorCode::CatalogUnavailable);
    assert!(entries(temp.path()).is_empty());
}

#[test]
fn test_stalled_artifact_body_is_fetch_error() {
    let addr = stalling_server(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\nabc");
    let client = stalling_client(addr);
    let temp = TempDir::new().unwrap();
    let key = ArtifactKey::new("local", "db1/k1");

    let started = Instant::now();
    let err = ArtifactFetcher::new(&client)
        .fetch(&key, &temp.path().join("k1.gz"))
        .unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(4));
    assert!(
        matches!(err, FetchError::Io { .. } | FetchError::Truncated { .. }),
        "{:?}",
        err
    );
    assert_eq!(err.key(), &key);
    assert!(entries(temp.path()).is_empty());
}

#[test]
fn test_stalled_ingest_times_out() {
    let addr = stalling_server(b"");
    let client = stalling_client(addr);

    let started = Instant::now();
    let err = client
        .ingest(
            &IngestTarget::Full { db: "db1".into() },
            &mut Cursor::new(b"full stream".to_vec()),
        )
        .unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(4));
    assert!(matches!(err, CatalogError::Transport { .. }), "{:?}", err);
}

#[cfg(unix)]
#[test]
fn test_failed_producer_upload_is_not_stored() {
    use std::os::unix::fs::PermissionsExt;

    use xtralab::backup::{BackupError, BackupProducer};
    use xtralab::config::MysqlConfig;

    let temp = TempDir::new().unwrap();
    let script = temp.path().join("xtrabackup");
    std::fs::write(&script, "#!/bin/sh\nprintf 'half-a-tar'\nexit 2\n").unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    let mut mysql = MysqlConfig::new("backup");
    mysql.xtrabackup_bin = script;

    let server = TestServer::start(Lab::default());
    let client = server.client();

    let err = BackupProducer::new(&client, &mysql)
        .full_backup("db1")
        .unwrap_err();

    assert!(matches!(err, BackupError::ProducerFailed { .. }), "{:?}", err);
    // Give the server a moment in case it was still reading the body
    thread::sleep(Duration::from_millis(200));
    assert!(server.ingested().is_empty());
}

//! Shared fixtures for integration tests
//!
//! Artifacts are built in-process exactly as xtrabackup + gzip would lay
//! them out: full backups as gzip(tar), increments as gzip(xbstream).

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;

use xtralab::catalog::{ArtifactKey, MemoryCatalog};
use xtralab::unpack::XbstreamWriter;

pub fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::fast());
    enc.write_all(bytes).unwrap();
    enc.finish().unwrap()
}

/// gzip(tar) full backup whose files name `marker`
pub fn base_artifact(marker: &str) -> Vec<u8> {
    let files: [(&str, String); 3] = [
        ("ibdata1", format!("system tablespace of {}", marker)),
        ("db1/t1.ibd", format!("rows of {}", marker)),
        (
            "xtrabackup_checkpoints",
            "backup_type = full-backuped\nfrom_lsn = 0\nto_lsn = 100\n".to_string(),
        ),
    ];

    let mut builder = tar::Builder::new(Vec::new());
    for (path, data) in &files {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o640);
        header.set_cksum();
        builder.append_data(&mut header, path, data.as_bytes()).unwrap();
    }
    gzip(&builder.into_inner().unwrap())
}

/// gzip(xbstream) increment whose files name `marker`
pub fn inc_artifact(marker: &str) -> Vec<u8> {
    let mut w = XbstreamWriter::with_chunk_size(Vec::new(), 16);
    w.add_file("ibdata1.delta", format!("delta of {}", marker).as_bytes())
        .unwrap();
    w.add_file("db1/t1.ibd.delta", format!("table delta of {}", marker).as_bytes())
        .unwrap();
    w.add_file("xtrabackup_checkpoints", b"backup_type = incremental\n")
        .unwrap();
    gzip(&w.finish().unwrap())
}

/// Newest-first keys `k<L>, ..., k2, k1`; `k1` is the full base
pub fn chain_keys(len: usize) -> Vec<ArtifactKey> {
    (1..=len)
        .rev()
        .map(|i| ArtifactKey::new("local", format!("db1/k{}", i)))
        .collect()
}

/// Catalog serving a complete chain of `len` artifacts for ("db1", "p")
pub fn catalog_with_chain(len: usize) -> (MemoryCatalog, Vec<ArtifactKey>) {
    let keys = chain_keys(len);
    let mut catalog = MemoryCatalog::new().with_chain("db1", "p", keys.clone());
    for (idx, key) in keys.iter().enumerate() {
        let bytes = if idx == len - 1 {
            base_artifact(&key.key)
        } else {
            inc_artifact(&key.key)
        };
        catalog = catalog.with_artifact(key.clone(), bytes);
    }
    (catalog, keys)
}

/// Relative path → contents of every file under `root`
pub fn tree(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    let mut out = BTreeMap::new();
    walk(root, root, &mut out);
    out
}

fn walk(root: &Path, dir: &Path, out: &mut BTreeMap<PathBuf, Vec<u8>>) {
    for entry in fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            walk(root, &path, out);
        } else {
            let rel = path.strip_prefix(root).unwrap().to_path_buf();
            out.insert(rel, fs::read(&path).unwrap());
        }
    }
}

/// Sorted names of the entries directly under `dir`
pub fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

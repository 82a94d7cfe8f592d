//! Artifact fetcher
//!
//! Downloads one artifact from the catalog into a local staging path.
//!
//! The body is streamed into a hidden `.partial` sibling of the
//! destination, fsynced, length-checked against what the catalog announced
//! and only then renamed into place. A crash or failure mid-download never
//! leaves a file under the final name.

mod errors;
mod throttle;

pub use errors::{FetchError, FetchResult};
pub use throttle::ThrottledReader;

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::catalog::{ArtifactKey, Catalog};

/// Fetches single artifacts from a catalog
pub struct ArtifactFetcher<'a, C: Catalog + ?Sized> {
    catalog: &'a C,
    max_bandwidth: Option<u64>,
}

impl<'a, C: Catalog + ?Sized> ArtifactFetcher<'a, C> {
    pub fn new(catalog: &'a C) -> Self {
        Self {
            catalog,
            max_bandwidth: None,
        }
    }

    /// Limit downloads to `bytes_per_sec` (unlimited when `None`)
    pub fn with_max_bandwidth(mut self, bytes_per_sec: Option<u64>) -> Self {
        self.max_bandwidth = bytes_per_sec.filter(|b| *b > 0);
        self
    }

    /// Download `key` to `dest`. Returns the number of bytes written.
    pub fn fetch(&self, key: &ArtifactKey, dest: &Path) -> FetchResult<u64> {
        let stream = self
            .catalog
            .open_artifact(key)
            .map_err(|source| FetchError::Catalog {
                key: key.clone(),
                source,
            })?;

        let reader: Box<dyn Read + Send> = match self.max_bandwidth {
            Some(bps) => Box::new(ThrottledReader::new(stream.reader, bps)),
            None => stream.reader,
        };

        let partial = partial_path(dest);
        let result = write_partial(reader, &partial)
            .map_err(|source| FetchError::Io {
                key: key.clone(),
                path: partial.clone(),
                source,
            })
            .and_then(|received| match stream.expected_len {
                Some(expected) if expected != received => Err(FetchError::Truncated {
                    key: key.clone(),
                    expected,
                    received,
                }),
                _ => Ok(received),
            })
            .and_then(|received| {
                fs::rename(&partial, dest)
                    .map(|_| received)
                    .map_err(|source| FetchError::Io {
                        key: key.clone(),
                        path: dest.to_path_buf(),
                        source,
                    })
            });

        match result {
            Ok(received) => {
                debug!(key = %key, bytes = received, path = %dest.display(), "artifact staged");
                Ok(received)
            }
            Err(e) => {
                if let Err(rm) = fs::remove_file(&partial) {
                    if rm.kind() != io::ErrorKind::NotFound {
                        warn!(path = %partial.display(), error = %rm, "could not remove partial download");
                    }
                }
                Err(e)
            }
        }
    }
}

/// Hidden, unique sibling of `dest` used while downloading
fn partial_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string());
    dest.with_file_name(format!(".{}.{}.partial", name, Uuid::new_v4().simple()))
}

fn write_partial(mut reader: Box<dyn Read + Send>, partial: &Path) -> io::Result<u64> {
    let file = File::create(partial)?;
    let mut writer = BufWriter::new(file);
    let written = io::copy(&mut reader, &mut writer)?;
    writer.flush()?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok(written)
}

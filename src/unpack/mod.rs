//! Unpack pipeline
//!
//! Turns fetched artifacts into directories:
//!
//! - base: `base.tar.gz` is gunzipped and untarred straight into `base/`
//! - increment: `incN.xb.gz` is gunzipped to `incN.xb`, which is then
//!   extracted as an xbstream container into `incN/`
//!
//! Increments are never merged into the base here.

mod errors;
pub mod xbstream;

pub use errors::{UnpackError, UnpackResult, UnpackStage};
pub use xbstream::{ExtractStats, XbstreamReader, XbstreamWriter};

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use tar::Archive;
use tracing::{debug, warn};

/// Records whether the wrapped reader ever failed, so a tar error can be
/// attributed to the gzip layer underneath it.
struct FailureTap<R> {
    inner: R,
    failed: bool,
}

impl<R: Read> Read for FailureTap<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf).map_err(|e| {
            self.failed = true;
            e
        })
    }
}

fn gz_reader(path: &Path) -> UnpackResult<MultiGzDecoder<BufReader<File>>> {
    let file = File::open(path).map_err(|e| UnpackError::decompress(path, e))?;
    Ok(MultiGzDecoder::new(BufReader::new(file)))
}

/// Extract a gzip-compressed tar archive into `dest`.
pub fn unpack_base(archive: &Path, dest: &Path) -> UnpackResult<()> {
    fs::create_dir_all(dest).map_err(|e| UnpackError::extract(dest, e))?;

    let tap = FailureTap {
        inner: gz_reader(archive)?,
        failed: false,
    };
    let mut tar = Archive::new(tap);
    tar.set_preserve_permissions(true);
    tar.set_overwrite(true);

    let result = tar.unpack(dest);
    let mut tap = tar.into_inner();
    if let Err(e) = result {
        return Err(if tap.failed {
            UnpackError::decompress(archive, e)
        } else {
            UnpackError::extract(dest, e)
        });
    }

    // tar stops at its end marker; drain the rest so the gzip trailer is
    // verified too.
    io::copy(&mut tap.inner, &mut io::sink()).map_err(|e| UnpackError::decompress(archive, e))?;

    debug!(archive = %archive.display(), dest = %dest.display(), "base extracted");
    Ok(())
}

/// Gunzip `archive` into `container`, extract that xbstream into `dest`,
/// then remove `container`.
pub fn unpack_increment(archive: &Path, container: &Path, dest: &Path) -> UnpackResult<ExtractStats> {
    gunzip_to(archive, container)?;

    fs::create_dir_all(dest).map_err(|e| UnpackError::extract(dest, e))?;
    let file = File::open(container).map_err(|e| UnpackError::extract(container, e))?;
    let stats =
        xbstream::extract(BufReader::new(file), dest).map_err(|e| UnpackError::extract(container, e))?;

    if let Err(e) = fs::remove_file(container) {
        warn!(path = %container.display(), error = %e, "could not remove xbstream container");
    }

    debug!(
        archive = %archive.display(),
        dest = %dest.display(),
        files = stats.files,
        bytes = stats.bytes,
        "increment extracted"
    );
    Ok(stats)
}

fn gunzip_to(archive: &Path, out: &Path) -> UnpackResult<u64> {
    let mut reader = gz_reader(archive)?;
    let file = File::create(out).map_err(|e| UnpackError::decompress(out, e))?;
    let mut writer = BufWriter::new(file);

    let written =
        io::copy(&mut reader, &mut writer).map_err(|e| UnpackError::decompress(archive, e))?;
    writer.flush().map_err(|e| UnpackError::decompress(out, e))?;
    Ok(written)
}

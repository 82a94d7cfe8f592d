//! Streaming upload: producer stdout → gzip → catalog
//!
//! The producer's exit status is part of the upload itself: the body only
//! reaches a clean end once the producer has exited successfully. A
//! producer that fails turns end-of-stream into a read error, so the
//! request is aborted before the catalog can accept a truncated artifact.

use std::io::{self, Read};
use std::process::{Child, ChildStdout, ExitStatus, Stdio};

use flate2::read::GzEncoder;
use flate2::Compression;
use tracing::{debug, info, warn};

use super::command::XtrabackupCommand;
use super::errors::{BackupError, BackupResult};
use crate::catalog::{IngestSink, IngestTarget};

/// Counts bytes handed to the sink
struct CountingReader<R> {
    inner: R,
    count: u64,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count += n as u64;
        Ok(n)
    }
}

/// Producer stdout that reaps the child at end of stream.
///
/// EOF is reported only for a successful exit; any other status becomes an
/// error for every subsequent read.
struct ProducerOutput<'c> {
    stdout: ChildStdout,
    child: &'c mut Child,
    status: Option<ExitStatus>,
}

impl Read for ProducerOutput<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.status.is_none() {
            let n = self.stdout.read(buf)?;
            if n > 0 || buf.is_empty() {
                return Ok(n);
            }
            self.status = Some(self.child.wait()?);
        }
        match self.status {
            Some(status) if !status.success() => Err(io::Error::new(
                io::ErrorKind::Other,
                format!("backup producer exited unsuccessfully ({})", status),
            )),
            _ => Ok(0),
        }
    }
}

/// Run `cmd` and stream its gzip-compressed stdout to `target`.
///
/// Returns the number of compressed bytes uploaded.
pub fn stream_to_sink<S: IngestSink + ?Sized>(
    cmd: &XtrabackupCommand,
    sink: &S,
    target: &IngestTarget,
) -> BackupResult<u64> {
    info!(command = %cmd.masked(), db = %target.db(), "starting backup producer");

    let mut child = cmd
        .to_command()
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|source| BackupError::Spawn {
            program: cmd.program().to_path_buf(),
            source,
        })?;

    let stdout = match child.stdout.take() {
        Some(stdout) => stdout,
        None => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(BackupError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "producer stdout not captured",
            )));
        }
    };

    let mut body = CountingReader {
        inner: GzEncoder::new(
            ProducerOutput {
                stdout,
                child: &mut child,
                status: None,
            },
            Compression::default(),
        ),
        count: 0,
    };
    let upload = sink.ingest(target, &mut body);
    let uploaded = body.count;
    let reaped = body.inner.get_ref().status;
    // Close our end of the pipe so a producer still writing cannot block wait()
    drop(body);

    let status = match (reaped, upload) {
        (Some(status), _) if !status.success() => status,
        (_, Err(e)) => {
            warn!(error = %e, "upload failed, stopping producer");
            if reaped.is_none() {
                let _ = child.kill();
                let _ = child.wait();
            }
            return Err(BackupError::Upload(e));
        }
        (Some(status), Ok(())) => status,
        // Sink finished without draining the stream
        (None, Ok(())) => child.wait()?,
    };

    if !status.success() {
        warn!(status = %status, "backup producer failed, upload aborted");
        return Err(BackupError::ProducerFailed {
            program: cmd.program().to_path_buf(),
            status: status.to_string(),
        });
    }

    debug!(bytes = uploaded, "backup stream uploaded");
    Ok(uploaded)
}

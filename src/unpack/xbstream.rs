//! xbstream container reader, extractor and writer
//!
//! xtrabackup streams incremental backups as a sequence of chunks:
//!
//! ```text
//! magic "XBSTCK01" | flags u8 | type u8 | path_len u32le | path
//!   type 'E':  (end of file, nothing follows)
//!   otherwise: payload_len u64le | offset u64le | crc32 u32le | payload
//! ```
//!
//! Payload chunks for one path arrive in offset order; an `E` chunk closes
//! the file. Chunks of an unknown type are skipped when the ignorable flag
//! is set and rejected otherwise.
//!
//! Sparse (`S`) chunks, written by xtrabackup 8.0 for punch-hole
//! compressed tablespaces, are not supported: a stream containing them is
//! rejected as invalid data. Such backups must be extracted
//! with `xbstream -x` instead.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, ErrorKind, Read, Write};
use std::path::{Component, Path, PathBuf};

use tracing::trace;

/// Chunk magic
pub const MAGIC: &[u8; 8] = b"XBSTCK01";

/// Flag bit marking a chunk readers may skip
pub const FLAG_IGNORABLE: u8 = 0x01;

const CHUNK_PAYLOAD: u8 = b'P';
const CHUNK_EOF: u8 = b'E';
const CHUNK_SPARSE: u8 = b'S';

/// Longest path accepted in a chunk header
const MAX_PATH_LEN: u32 = 4096;

/// Largest payload accepted in one chunk; xtrabackup writes ~10MB chunks
const MAX_PAYLOAD_LEN: u64 = 1 << 30;

/// Default payload size used by [`XbstreamWriter`]
pub const DEFAULT_CHUNK_SIZE: usize = 10 * 1024 * 1024;

/// One decoded chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    Payload {
        path: String,
        offset: u64,
        data: Vec<u8>,
    },
    Eof {
        path: String,
    },
    /// Unknown chunk type carrying the ignorable flag
    Skipped {
        path: String,
        chunk_type: u8,
    },
}

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(ErrorKind::InvalidData, msg.into())
}

/// Streaming chunk decoder
pub struct XbstreamReader<R> {
    inner: R,
}

impl<R: Read> XbstreamReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Next chunk, or `None` at a clean end of stream.
    pub fn next_chunk(&mut self) -> io::Result<Option<Chunk>> {
        let mut magic = [0u8; 8];
        if !self.read_magic(&mut magic)? {
            return Ok(None);
        }
        if &magic != MAGIC {
            return Err(invalid("bad xbstream chunk magic"));
        }

        let flags = self.read_u8()?;
        let chunk_type = self.read_u8()?;
        let known = chunk_type == CHUNK_PAYLOAD || chunk_type == CHUNK_EOF;
        if chunk_type == CHUNK_SPARSE {
            return Err(invalid(
                "sparse xbstream chunks (punch-hole tablespaces) are not supported",
            ));
        }
        if !known && flags & FLAG_IGNORABLE == 0 {
            return Err(invalid(format!(
                "unsupported xbstream chunk type {:?}",
                chunk_type as char
            )));
        }

        let path_len = self.read_u32()?;
        if path_len == 0 || path_len > MAX_PATH_LEN {
            return Err(invalid(format!("invalid xbstream path length {}", path_len)));
        }
        let mut path_buf = vec![0u8; path_len as usize];
        self.inner.read_exact(&mut path_buf)?;
        let path =
            String::from_utf8(path_buf).map_err(|_| invalid("xbstream path is not UTF-8"))?;

        if chunk_type == CHUNK_EOF {
            return Ok(Some(Chunk::Eof { path }));
        }

        let payload_len = self.read_u64()?;
        let offset = self.read_u64()?;
        let checksum = self.read_u32()?;
        if payload_len > MAX_PAYLOAD_LEN {
            return Err(invalid(format!(
                "xbstream payload for {} too large: {} bytes",
                path, payload_len
            )));
        }

        // Header is untrusted; let the buffer grow with what actually arrives
        let mut data = Vec::with_capacity(payload_len.min(DEFAULT_CHUNK_SIZE as u64) as usize);
        (&mut self.inner).take(payload_len).read_to_end(&mut data)?;
        if data.len() as u64 != payload_len {
            return Err(io::Error::new(
                ErrorKind::UnexpectedEof,
                format!("truncated xbstream payload for {}", path),
            ));
        }

        if !known {
            return Ok(Some(Chunk::Skipped { path, chunk_type }));
        }

        let actual = crc32fast::hash(&data);
        if actual != checksum {
            return Err(invalid(format!(
                "xbstream checksum mismatch for {} at offset {}: expected {:08x}, got {:08x}",
                path, offset, checksum, actual
            )));
        }

        Ok(Some(Chunk::Payload { path, offset, data }))
    }

    /// Fills `buf`; false on EOF before the first byte.
    fn read_magic(&mut self, buf: &mut [u8; 8]) -> io::Result<bool> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) if filled == 0 => return Ok(false),
                Ok(0) => {
                    return Err(io::Error::new(
                        ErrorKind::UnexpectedEof,
                        "truncated xbstream chunk header",
                    ))
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }

    fn read_u8(&mut self) -> io::Result<u8> {
        let mut b = [0u8; 1];
        self.inner.read_exact(&mut b)?;
        Ok(b[0])
    }

    fn read_u32(&mut self) -> io::Result<u32> {
        let mut b = [0u8; 4];
        self.inner.read_exact(&mut b)?;
        Ok(u32::from_le_bytes(b))
    }

    fn read_u64(&mut self) -> io::Result<u64> {
        let mut b = [0u8; 8];
        self.inner.read_exact(&mut b)?;
        Ok(u64::from_le_bytes(b))
    }
}

/// Counters reported by [`extract`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractStats {
    pub files: usize,
    pub bytes: u64,
}

/// Resolve a chunk path below `dest`, refusing anything that escapes it.
fn safe_join(dest: &Path, path: &str) -> io::Result<PathBuf> {
    let rel = Path::new(path);
    let mut out = dest.to_path_buf();
    for component in rel.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => return Err(invalid(format!("unsafe path in xbstream: {}", path))),
        }
    }
    if out == dest {
        return Err(invalid(format!("empty path in xbstream: {:?}", path)));
    }
    Ok(out)
}

struct OpenFile {
    writer: BufWriter<File>,
    written: u64,
}

fn open_target(dest: &Path, path: &str) -> io::Result<OpenFile> {
    let target = safe_join(dest, path)?;
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(&target)?;
    Ok(OpenFile {
        writer: BufWriter::new(file),
        written: 0,
    })
}

fn close_target(file: OpenFile) -> io::Result<()> {
    let file = file.writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()
}

/// Extract every file in the stream below `dest`.
pub fn extract<R: Read>(reader: R, dest: &Path) -> io::Result<ExtractStats> {
    let mut stream = XbstreamReader::new(reader);
    let mut open: HashMap<String, OpenFile> = HashMap::new();
    let mut stats = ExtractStats::default();

    while let Some(chunk) = stream.next_chunk()? {
        match chunk {
            Chunk::Payload { path, offset, data } => {
                if !open.contains_key(&path) {
                    open.insert(path.clone(), open_target(dest, &path)?);
                    stats.files += 1;
                }
                let file = open
                    .get_mut(&path)
                    .ok_or_else(|| invalid(format!("lost handle for {}", path)))?;
                if offset != file.written {
                    return Err(invalid(format!(
                        "out-of-order xbstream chunk for {}: offset {}, expected {}",
                        path, offset, file.written
                    )));
                }
                file.writer.write_all(&data)?;
                file.written += data.len() as u64;
                stats.bytes += data.len() as u64;
            }
            Chunk::Eof { path } => match open.remove(&path) {
                Some(file) => close_target(file)?,
                None => {
                    // File without payload chunks is empty
                    close_target(open_target(dest, &path)?)?;
                    stats.files += 1;
                }
            },
            Chunk::Skipped { path, chunk_type } => {
                trace!(path = %path, chunk_type, "skipping ignorable xbstream chunk");
            }
        }
    }

    for (_, file) in open.drain() {
        close_target(file)?;
    }

    Ok(stats)
}

/// Encoder for the same format
pub struct XbstreamWriter<W: Write> {
    inner: W,
    chunk_size: usize,
}

impl<W: Write> XbstreamWriter<W> {
    pub fn new(inner: W) -> Self {
        Self::with_chunk_size(inner, DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(inner: W, chunk_size: usize) -> Self {
        Self {
            inner,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Write `data` as `path`, split into payload chunks, then close it.
    pub fn add_file(&mut self, path: &str, data: &[u8]) -> io::Result<()> {
        let mut offset = 0u64;
        for part in data.chunks(self.chunk_size) {
            self.write_payload(path, offset, part)?;
            offset += part.len() as u64;
        }
        self.write_header(0, CHUNK_EOF, path)
    }

    /// Write a raw chunk of arbitrary type; used to emit ignorable chunks.
    pub fn add_raw_chunk(
        &mut self,
        flags: u8,
        chunk_type: u8,
        path: &str,
        data: &[u8],
    ) -> io::Result<()> {
        self.write_header(flags, chunk_type, path)?;
        self.inner.write_all(&(data.len() as u64).to_le_bytes())?;
        self.inner.write_all(&0u64.to_le_bytes())?;
        self.inner.write_all(&crc32fast::hash(data).to_le_bytes())?;
        self.inner.write_all(data)
    }

    pub fn finish(mut self) -> io::Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }

    fn write_header(&mut self, flags: u8, chunk_type: u8, path: &str) -> io::Result<()> {
        self.inner.write_all(MAGIC)?;
        self.inner.write_all(&[flags, chunk_type])?;
        self.inner.write_all(&(path.len() as u32).to_le_bytes())?;
        self.inner.write_all(path.as_bytes())
    }

    fn write_payload(&mut self, path: &str, offset: u64, data: &[u8]) -> io::Result<()> {
        self.write_header(0, CHUNK_PAYLOAD, path)?;
        self.inner.write_all(&(data.len() as u64).to_le_bytes())?;
        self.inner.write_all(&offset.to_le_bytes())?;
        self.inner.write_all(&crc32fast::hash(data).to_le_bytes())?;
        self.inner.write_all(data)
    }
}

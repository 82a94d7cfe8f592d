//! Download bandwidth limiting

use std::io::{self, Read};
use std::thread;
use std::time::{Duration, Instant};

/// Reader that sleeps as needed to stay under `bytes_per_sec` on average.
pub struct ThrottledReader<R> {
    inner: R,
    bytes_per_sec: u64,
    started: Instant,
    consumed: u64,
}

impl<R: Read> ThrottledReader<R> {
    /// `bytes_per_sec` must be non-zero.
    pub fn new(inner: R, bytes_per_sec: u64) -> Self {
        Self {
            inner,
            bytes_per_sec: bytes_per_sec.max(1),
            started: Instant::now(),
            consumed: 0,
        }
    }

    fn budget_for(&self, consumed: u64) -> Duration {
        Duration::from_secs_f64(consumed as f64 / self.bytes_per_sec as f64)
    }
}

impl<R: Read> Read for ThrottledReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        // Never pull more than one second's worth at once
        let cap = buf.len().min(self.bytes_per_sec as usize).max(1);
        let n = self.inner.read(&mut buf[..cap])?;
        self.consumed += n as u64;

        let due = self.budget_for(self.consumed);
        let elapsed = self.started.elapsed();
        if due > elapsed {
            thread::sleep(due - elapsed);
        }
        Ok(n)
    }
}

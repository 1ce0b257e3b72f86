//! COMPRESS=DEFLATE (RFC 4978).
//!
//! Raw deflate in both directions, no zlib header. Every write ends with a
//! sync flush so the server can decode each command as soon as it arrives.

use bytes::BytesMut;
use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

use crate::{Error, Result};

const CHUNK: usize = 16 * 1024;

fn delta(after: u64, before: u64) -> usize {
    usize::try_from(after.saturating_sub(before)).unwrap_or(usize::MAX)
}

/// Deflate state for one connection.
pub struct Deflate {
    deflate: Compress,
    inflate: Decompress,
}

impl std::fmt::Debug for Deflate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deflate")
            .field("sent", &self.deflate.total_out())
            .field("received", &self.inflate.total_in())
            .finish()
    }
}

impl Default for Deflate {
    fn default() -> Self {
        Self::new()
    }
}

impl Deflate {
    /// Creates fresh compression state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            deflate: Compress::new(Compression::default(), false),
            inflate: Decompress::new(false),
        }
    }

    /// Compresses one outgoing write and sync-flushes it.
    pub fn compress(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(input.len() / 2 + 64);
        let mut chunk = vec![0u8; CHUNK];
        let mut consumed = 0;
        loop {
            let (in_before, out_before) = (self.deflate.total_in(), self.deflate.total_out());
            self.deflate
                .compress(&input[consumed..], &mut chunk, FlushCompress::Sync)
                .map_err(|e| Error::Protocol(format!("deflate failed: {e}")))?;
            consumed += delta(self.deflate.total_in(), in_before);
            let written = delta(self.deflate.total_out(), out_before);
            out.extend_from_slice(&chunk[..written]);
            if consumed >= input.len() && written < chunk.len() {
                return Ok(out);
            }
        }
    }

    /// Inflates received bytes into `out`.
    pub fn decompress(&mut self, input: &[u8], out: &mut BytesMut) -> Result<()> {
        let mut chunk = vec![0u8; CHUNK];
        let mut consumed = 0;
        loop {
            let (in_before, out_before) = (self.inflate.total_in(), self.inflate.total_out());
            let status = self
                .inflate
                .decompress(&input[consumed..], &mut chunk, FlushDecompress::Sync)
                .map_err(|e| Error::Protocol(format!("inflate failed: {e}")))?;
            let read = delta(self.inflate.total_in(), in_before);
            let written = delta(self.inflate.total_out(), out_before);
            consumed += read;
            out.extend_from_slice(&chunk[..written]);

            let drained = consumed >= input.len() && written < chunk.len();
            if drained || matches!(status, Status::StreamEnd) || (read == 0 && written == 0) {
                return Ok(());
            }
        }
    }
}

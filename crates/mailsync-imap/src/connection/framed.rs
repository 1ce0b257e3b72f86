//! Framed I/O for the IMAP protocol.
//!
//! A response is one CRLF-terminated line plus, for every line ending in a
//! literal announcement `{n}`, exactly `n` octets and the rest of the
//! response after them. Reads are cancel-safe: partial data stays in the
//! buffer, so a timed-out read can be retried.

#![allow(clippy::missing_errors_doc)]

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::compress::Deflate;
use crate::{Error, Result};

/// Default buffer size for reading.
const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Maximum line length to prevent memory exhaustion.
const MAX_LINE_LENGTH: usize = 1024 * 1024; // 1 MB

/// Maximum literal size to prevent memory exhaustion.
const MAX_LITERAL_SIZE: usize = 100 * 1024 * 1024; // 100 MB

/// Framed connection for IMAP protocol.
pub struct FramedStream<S> {
    stream: S,
    buffer: BytesMut,
    deflate: Option<Deflate>,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new framed stream.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(DEFAULT_BUFFER_SIZE),
            deflate: None,
        }
    }

    /// Reads one complete response, literals included.
    pub async fn read_response(&mut self) -> Result<Vec<u8>> {
        let mut chunk = [0u8; DEFAULT_BUFFER_SIZE];
        loop {
            if let Some(len) = complete_response_len(&self.buffer)? {
                let response = self.buffer.split_to(len).to_vec();
                tracing::trace!(len, "received response");
                return Ok(response);
            }

            let n = self.stream.read(&mut chunk).await?;
            if n == 0 {
                return Err(Error::ConnectionLost);
            }
            match self.deflate.as_mut() {
                Some(deflate) => deflate.decompress(&chunk[..n], &mut self.buffer)?,
                None => self.buffer.extend_from_slice(&chunk[..n]),
            }
        }
    }

    /// Writes and flushes `data`, compressing it when COMPRESS is active.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        match self.deflate.as_mut() {
            Some(deflate) => {
                let compressed = deflate.compress(data)?;
                self.stream.write_all(&compressed).await?;
            }
            None => self.stream.write_all(data).await?,
        }
        self.stream.flush().await?;
        Ok(())
    }

    /// Switches both directions to deflate. Bytes already buffered arrived
    /// after the server's OK and are compressed too.
    pub fn enable_compression(&mut self) -> Result<()> {
        let mut deflate = Deflate::new();
        let pending = self.buffer.split();
        if !pending.is_empty() {
            deflate.decompress(&pending, &mut self.buffer)?;
        }
        self.deflate = Some(deflate);
        Ok(())
    }

    /// Returns true once COMPRESS=DEFLATE is active.
    #[must_use]
    pub const fn is_compressed(&self) -> bool {
        self.deflate.is_some()
    }

    /// Gets a reference to the underlying stream.
    pub const fn get_ref(&self) -> &S {
        &self.stream
    }

    /// Returns the inner stream for a TLS upgrade.
    ///
    /// Fails if the server sent anything after the STARTTLS completion,
    /// since that data would bypass TLS.
    pub fn into_inner(mut self) -> Result<S> {
        if !self.buffer.is_empty() {
            let leftover = self.buffer.remaining();
            self.buffer.clear();
            return Err(Error::Protocol(format!(
                "{leftover} unexpected bytes before TLS negotiation"
            )));
        }
        Ok(self.stream)
    }
}

/// Finds the position of CRLF in a buffer.
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Parses a literal length from the end of a line.
///
/// Matches `{123}\r\n` and the non-synchronizing `{123+}\r\n`.
fn parse_literal_length(line: &[u8]) -> Option<usize> {
    let line = line.strip_suffix(b"\r\n")?;
    let line = line.strip_suffix(b"}")?;
    let line = line.strip_suffix(b"+").unwrap_or(line);
    let open = line.iter().rposition(|&b| b == b'{')?;
    let digits = &line[open + 1..];
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}

/// Length of the first complete response in `buf`, if there is one.
fn complete_response_len(buf: &[u8]) -> Result<Option<usize>> {
    let mut pos = 0;
    loop {
        let Some(crlf) = find_crlf(&buf[pos..]) else {
            if buf.len() - pos > MAX_LINE_LENGTH {
                return Err(Error::Protocol("line too long".to_string()));
            }
            return Ok(None);
        };
        let line_end = pos + crlf + 2;
        if line_end - pos > MAX_LINE_LENGTH {
            return Err(Error::Protocol("line too long".to_string()));
        }
        let Some(literal_len) = parse_literal_length(&buf[pos..line_end]) else {
            return Ok(Some(line_end));
        };
        if literal_len > MAX_LITERAL_SIZE {
            return Err(Error::Protocol(format!(
                "literal too large: {literal_len} bytes (max {MAX_LITERAL_SIZE})"
            )));
        }
        let next = line_end + literal_len;
        if buf.len() < next {
            return Ok(None);
        }
        pos = next;
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[test]
    fn test_find_crlf() {
        assert_eq!(find_crlf(b"hello\r\n"), Some(5));
        assert_eq!(find_crlf(b"\r\n"), Some(0));
        assert_eq!(find_crlf(b"no newline"), None);
        assert_eq!(find_crlf(b"just\n"), None);
    }

    #[test]
    fn test_parse_literal_length() {
        assert_eq!(parse_literal_length(b"BODY {123}\r\n"), Some(123));
        assert_eq!(parse_literal_length(b"BODY {123+}\r\n"), Some(123));
        assert_eq!(parse_literal_length(b"{0}\r\n"), Some(0));
        assert_eq!(parse_literal_length(b"no literal\r\n"), None);
        assert_eq!(parse_literal_length(b"incomplete {123"), None);
        assert_eq!(parse_literal_length(b"wrong {abc}\r\n"), None);
        assert_eq!(parse_literal_length(b"empty {}\r\n"), None);
    }

    #[test]
    fn test_complete_response_len_waits_for_literal() {
        assert_eq!(complete_response_len(b"* OK").unwrap(), None);
        assert_eq!(complete_response_len(b"* 1 FETCH (BODY {5}\r\nhel").unwrap(), None);
        assert_eq!(complete_response_len(b"* 1 FETCH (BODY {5}\r\nhello)\r\n").unwrap(), Some(29));
        assert_eq!(complete_response_len(b"* OK\r\n* NO\r\n").unwrap(), Some(6));
    }

    #[tokio::test]
    async fn test_framed_read_simple_line() {
        let mock = Builder::new().read(b"* OK ready\r\n").build();
        let mut framed = FramedStream::new(mock);

        let response = framed.read_response().await.unwrap();
        assert_eq!(response, b"* OK ready\r\n");
    }

    #[tokio::test]
    async fn test_framed_read_with_binary_literal() {
        let mock = Builder::new()
            .read(b"* 1 FETCH (BODY[] {6}\r\n")
            .read(b"a\r\n\0b")
            .read(b"c)\r\n* 2 EXISTS\r\n")
            .build();
        let mut framed = FramedStream::new(mock);

        let response = framed.read_response().await.unwrap();
        assert_eq!(response, b"* 1 FETCH (BODY[] {6}\r\na\r\n\0bc)\r\n");
        assert_eq!(framed.read_response().await.unwrap(), b"* 2 EXISTS\r\n");
    }

    #[tokio::test]
    async fn test_framed_eof_is_connection_lost() {
        let mock = Builder::new().read(b"* OK partial").build();
        let mut framed = FramedStream::new(mock);
        assert!(matches!(framed.read_response().await, Err(Error::ConnectionLost)));
    }

    #[tokio::test]
    async fn test_framed_write() {
        let mock = Builder::new().write(b"A0001 NOOP\r\n").build();
        let mut framed = FramedStream::new(mock);
        framed.write_all(b"A0001 NOOP\r\n").await.unwrap();
    }

    #[tokio::test]
    async fn test_literal_size_validation() {
        let header = format!("* 1 FETCH (BODY {{{}}}\r\n", MAX_LITERAL_SIZE + 1);
        let mock = Builder::new().read(header.as_bytes()).build();
        let mut framed = FramedStream::new(mock);

        let err = framed.read_response().await.unwrap_err();
        assert!(err.to_string().contains("literal too large"));
    }

    #[tokio::test]
    async fn test_line_length_limit() {
        let long_line = "A".repeat(MAX_LINE_LENGTH + 100);
        let mock = Builder::new().read(long_line.as_bytes()).build();
        let mut framed = FramedStream::new(mock);

        let err = framed.read_response().await.unwrap_err();
        assert!(err.to_string().contains("line too long"));
    }

    #[tokio::test]
    async fn test_compressed_reads_and_writes() {
        let mut server = Deflate::new();
        let mut client_side = Deflate::new();
        let expected_write = client_side.compress(b"A0002 NOOP\r\n").unwrap();
        let incoming = server.compress(b"* 3 EXISTS\r\nA0002 OK done\r\n").unwrap();

        let mock = Builder::new()
            .write(&expected_write)
            .read(&incoming)
            .build();
        let mut framed = FramedStream::new(mock);
        framed.enable_compression().unwrap();
        assert!(framed.is_compressed());

        framed.write_all(b"A0002 NOOP\r\n").await.unwrap();
        assert_eq!(framed.read_response().await.unwrap(), b"* 3 EXISTS\r\n");
        assert_eq!(framed.read_response().await.unwrap(), b"A0002 OK done\r\n");
    }

    #[tokio::test]
    async fn test_into_inner_rejects_buffered_data() {
        let mock = Builder::new()
            .read(b"A0001 OK Begin TLS\r\n* injected\r\n")
            .build();
        let mut framed = FramedStream::new(mock);
        framed.read_response().await.unwrap();
        assert!(framed.into_inner().is_err());
    }
}

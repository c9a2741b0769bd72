//! Line framing for IMAP connections.
//!
//! The monitor consumes the server one CRLF-terminated line at a time. FETCH
//! literals are not reassembled: their header lines come through as ordinary
//! lines, which is exactly what the line classifier expects.

#![allow(clippy::missing_errors_doc)]

use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf,
    WriteHalf,
};

use crate::{Error, Result};

/// Default buffer size for reading.
const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Maximum line length to prevent memory exhaustion.
const MAX_LINE_LENGTH: usize = 1024 * 1024; // 1 MB

/// Buffered, line-oriented connection.
pub struct FramedStream<S> {
    reader: BufReader<S>,
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new framed stream.
    pub fn new(stream: S) -> Self {
        Self {
            reader: BufReader::with_capacity(DEFAULT_BUFFER_SIZE, stream),
        }
    }

    /// Reads one line, without its CRLF.
    pub async fn read_line(&mut self) -> Result<String> {
        read_line(&mut self.reader).await
    }

    /// Writes one line, appending CRLF.
    pub async fn write_line(&mut self, line: &str) -> Result<()> {
        write_line(self.reader.get_mut(), line).await
    }

    /// Reads lines until the completion for `tag` arrives.
    ///
    /// Returns every line read, the completion last.
    pub async fn read_until_tagged(&mut self, tag: &str) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        loop {
            let line = self.read_line().await?;
            let done = is_tagged(&line, tag);
            lines.push(line);
            if done {
                return Ok(lines);
            }
        }
    }

    /// Consumes the framed stream and returns the inner stream.
    ///
    /// Note: Any buffered data will be lost.
    pub fn into_inner(self) -> S {
        self.reader.into_inner()
    }

    /// Splits into a line reader and a raw writer, keeping buffered input.
    pub fn into_split(self) -> (LineReader<ReadHalf<BufReader<S>>>, WriteHalf<BufReader<S>>) {
        let (read, write) = tokio::io::split(self.reader);
        (LineReader::new(read), write)
    }
}

/// Read half of a split [`FramedStream`].
pub struct LineReader<R> {
    reader: BufReader<R>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    /// Wraps a reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::with_capacity(DEFAULT_BUFFER_SIZE, reader),
        }
    }

    /// Reads one line, without its CRLF.
    pub async fn read_line(&mut self) -> Result<String> {
        read_line(&mut self.reader).await
    }
}

/// Writes `line` followed by CRLF and flushes.
pub async fn write_line<W>(writer: &mut W, line: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::with_capacity(line.len() + 2);
    buf.extend_from_slice(line.as_bytes());
    buf.extend_from_slice(b"\r\n");
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads a single CRLF-terminated line.
///
/// Invalid UTF-8 is replaced rather than rejected; header values in FETCH
/// literals are not guaranteed to be UTF-8.
async fn read_line<R>(reader: &mut R) -> Result<String>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();

    loop {
        let buf = reader.fill_buf().await?;
        if buf.is_empty() {
            return Err(Error::TransportClosed);
        }

        // CRLF split across reads: the CR is already in `line`.
        if line.ends_with(b"\r") && buf.starts_with(b"\n") {
            line.pop();
            reader.consume(1);
            break;
        }

        // Look for CRLF
        if let Some(pos) = find_crlf(buf) {
            line.extend_from_slice(&buf[..pos]);
            reader.consume(pos + 2);
            break;
        }

        let take = buf.len();
        line.extend_from_slice(buf);
        reader.consume(take);

        if line.len() > MAX_LINE_LENGTH {
            return Err(Error::ProtocolViolation("line too long".to_string()));
        }
    }

    Ok(String::from_utf8_lossy(&line).into_owned())
}

/// Finds the position of CRLF in a buffer.
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Returns true if `line` is a completion for `tag`.
fn is_tagged(line: &str, tag: &str) -> bool {
    line.strip_prefix(tag)
        .is_some_and(|rest| rest.starts_with(' '))
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
        assert_eq!(find_crlf(b"just\r"), None);
    }

    #[test]
    fn test_is_tagged() {
        assert!(is_tagged("A0001 OK done", "A0001"));
        assert!(!is_tagged("A00010 OK done", "A0001"));
        assert!(!is_tagged("* OK A0001", "A0001"));
    }

    #[tokio::test]
    async fn test_read_simple_line() {
        let mock = Builder::new().read(b"* OK ready\r\n").build();
        let mut framed = FramedStream::new(mock);

        assert_eq!(framed.read_line().await.unwrap(), "* OK ready");
    }

    #[tokio::test]
    async fn test_fetch_literal_arrives_as_lines() {
        let mock = Builder::new()
            .read(b"* 1 FETCH (BODY[HEADER.FIELDS (FROM SUBJECT)] {36}\r\n")
            .read(b"From: a@example.com\r\nSubject: hi\r\n\r\n)\r\n")
            .build();
        let mut framed = FramedStream::new(mock);

        let mut lines = Vec::new();
        for _ in 0..5 {
            lines.push(framed.read_line().await.unwrap());
        }
        assert_eq!(
            lines,
            vec![
                "* 1 FETCH (BODY[HEADER.FIELDS (FROM SUBJECT)] {36}",
                "From: a@example.com",
                "Subject: hi",
                "",
                ")",
            ]
        );
    }

    #[tokio::test]
    async fn test_crlf_split_across_reads() {
        let mock = Builder::new()
            .read(b"* 3 EXISTS\r")
            .read(b"\n* 1 RECENT\r\n")
            .build();
        let mut framed = FramedStream::new(mock);

        assert_eq!(framed.read_line().await.unwrap(), "* 3 EXISTS");
        assert_eq!(framed.read_line().await.unwrap(), "* 1 RECENT");
    }

    #[tokio::test]
    async fn test_lone_cr_read_still_ends_line() {
        let mock = Builder::new()
            .read(b"N0002 OK")
            .read(b"\r")
            .read(b"\n* 4 EXISTS\r\n")
            .build();
        let (mut reader, _writer) = FramedStream::new(mock).into_split();

        assert_eq!(reader.read_line().await.unwrap(), "N0002 OK");
        assert_eq!(reader.read_line().await.unwrap(), "* 4 EXISTS");
    }

    #[tokio::test]
    async fn test_eof_is_transport_closed() {
        let mock = Builder::new().build();
        let mut framed = FramedStream::new(mock);

        assert!(matches!(
            framed.read_line().await,
            Err(Error::TransportClosed)
        ));
    }

    #[tokio::test]
    async fn test_write_line() {
        let mock = Builder::new().write(b"N0003 NOOP\r\n").build();
        let mut framed = FramedStream::new(mock);

        framed.write_line("N0003 NOOP").await.unwrap();
    }

    #[tokio::test]
    async fn test_read_until_tagged() {
        let mock = Builder::new()
            .read(b"* CAPABILITY IMAP4rev1 IDLE NOTIFY\r\n")
            .read(b"A0002 OK LOGIN completed\r\n")
            .build();
        let mut framed = FramedStream::new(mock);

        let lines = framed.read_until_tagged("A0002").await.unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "A0002 OK LOGIN completed");
    }

    #[tokio::test]
    async fn test_split_keeps_buffered_lines() {
        let mock = Builder::new()
            .read(b"* OK hello\r\n* 2 EXISTS\r\n")
            .build();
        let mut framed = FramedStream::new(mock);
        assert_eq!(framed.read_line().await.unwrap(), "* OK hello");

        let (mut reader, _writer) = framed.into_split();
        assert_eq!(reader.read_line().await.unwrap(), "* 2 EXISTS");
    }

    #[tokio::test]
    async fn test_line_length_limit() {
        let long_line = "A".repeat(MAX_LINE_LENGTH + 100);
        let mock = Builder::new().read(long_line.as_bytes()).build();
        let mut framed = FramedStream::new(mock);

        let result = framed.read_line().await;
        assert!(result.unwrap_err().to_string().contains("line too long"));
    }
}

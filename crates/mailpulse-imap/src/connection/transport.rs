//! A socket handed over to the monitor.
//!
//! The stream is split into two tasks. The reader forwards every line to the
//! dispatcher stamped with the account and connection identity, then reports
//! the close. The writer drains a queue so that [`Transport::send`] never
//! blocks the dispatcher.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::framed::{FramedStream, write_line};
use crate::host::Transport;
use crate::monitor::{MonitorEvent, MonitorHandle};
use crate::types::{AccountId, ConnectionId};
use crate::{Error, Result};

/// [`Transport`] over a real socket.
#[derive(Debug)]
pub struct StreamTransport {
    id: ConnectionId,
    outbound: Option<mpsc::UnboundedSender<String>>,
    eof: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

impl StreamTransport {
    /// Takes over `framed`, starting its reader and writer tasks.
    ///
    /// Lines already buffered in `framed` are delivered first.
    pub fn spawn<S>(framed: FramedStream<S>, account: AccountId, events: MonitorHandle) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let id = ConnectionId::next();
        let eof = Arc::new(AtomicBool::new(false));
        let (mut lines, mut writer) = framed.into_split();
        let (outbound, mut queue) = mpsc::unbounded_channel::<String>();

        let reader_eof = Arc::clone(&eof);
        let reader = tokio::spawn(async move {
            loop {
                match lines.read_line().await {
                    Ok(line) => {
                        let event = MonitorEvent::Line {
                            account: account.clone(),
                            connection: id,
                            line,
                        };
                        if !events.send(event) {
                            break;
                        }
                    }
                    Err(Error::TransportClosed) => break,
                    Err(e) => {
                        tracing::warn!(%account, connection = %id, error = %e, "read failed");
                        break;
                    }
                }
            }
            reader_eof.store(true, Ordering::SeqCst);
            events.send(MonitorEvent::Closed {
                account,
                connection: id,
            });
        });

        tokio::spawn(async move {
            while let Some(line) = queue.recv().await {
                if let Err(e) = write_line(&mut writer, &line).await {
                    tracing::warn!(connection = %id, error = %e, "write failed");
                    break;
                }
            }
            let _ = writer.shutdown().await;
        });

        Self {
            id,
            outbound: Some(outbound),
            eof,
            reader,
        }
    }

    /// Shared end-of-stream flag, for a pool that wants to know when a lent
    /// connection died.
    #[must_use]
    pub fn eof_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.eof)
    }
}

impl Transport for StreamTransport {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn send(&mut self, line: &str) -> Result<()> {
        if self.is_eof() {
            return Err(Error::TransportClosed);
        }
        let outbound = self.outbound.as_ref().ok_or(Error::TransportClosed)?;
        outbound
            .send(line.to_string())
            .map_err(|_| Error::TransportClosed)
    }

    fn is_eof(&self) -> bool {
        self.eof.load(Ordering::SeqCst)
    }

    fn close(&mut self) {
        self.outbound = None;
        self.reader.abort();
        self.eof.store(true, Ordering::SeqCst);
    }
}

impl Drop for StreamTransport {
    fn drop(&mut self) {
        self.reader.abort();
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
    use crate::monitor::channel;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    #[tokio::test]
    async fn test_lines_are_forwarded_with_identity() {
        let (local, mut remote) = tokio::io::duplex(1024);
        let (handle, mut events) = channel();
        let transport =
            StreamTransport::spawn(FramedStream::new(local), AccountId::new("work"), handle);

        remote.write_all(b"* 4 EXISTS\r\n").await.unwrap();

        let event = events.recv().await.unwrap();
        assert_eq!(
            event,
            MonitorEvent::Line {
                account: AccountId::new("work"),
                connection: transport.id(),
                line: "* 4 EXISTS".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_send_appends_crlf() {
        let (local, remote) = tokio::io::duplex(1024);
        let (handle, _events) = channel();
        let mut transport =
            StreamTransport::spawn(FramedStream::new(local), AccountId::new("work"), handle);

        transport.send("N0003 NOOP").unwrap();

        let mut remote = BufReader::new(remote);
        let mut line = String::new();
        remote.read_line(&mut line).await.unwrap();
        assert_eq!(line, "N0003 NOOP\r\n");
    }

    #[tokio::test]
    async fn test_remote_close_reports_eof() {
        let (local, remote) = tokio::io::duplex(1024);
        let (handle, mut events) = channel();
        let mut transport =
            StreamTransport::spawn(FramedStream::new(local), AccountId::new("work"), handle);
        let id = transport.id();

        drop(remote);

        let event = events.recv().await.unwrap();
        assert_eq!(
            event,
            MonitorEvent::Closed {
                account: AccountId::new("work"),
                connection: id,
            }
        );
        assert!(transport.is_eof());
        assert!(transport.eof_flag().load(Ordering::SeqCst));
        assert!(matches!(
            transport.send("N0003 NOOP"),
            Err(Error::TransportClosed)
        ));
    }

    #[tokio::test]
    async fn test_close_rejects_sends() {
        let (local, _remote) = tokio::io::duplex(1024);
        let (handle, _events) = channel();
        let mut transport =
            StreamTransport::spawn(FramedStream::new(local), AccountId::new("work"), handle);

        transport.close();

        assert!(transport.is_eof());
        assert!(transport.send("N0003 NOOP").is_err());
    }
}

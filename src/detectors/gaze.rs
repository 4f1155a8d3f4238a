use serde::Deserialize;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{DetectorError, DetectorHandle};
use crate::kernel::event::EventKind;
use crate::kernel::store::EventStore;
use crate::kernel::time;

/// How the inbound byte stream is cut into messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Framing {
    /// Every successful read is one message. Bytes are decoded as lossy
    /// UTF-8, so invalid sequences (or a character split across two reads)
    /// come through as U+FFFD.
    #[default]
    Chunk,
    /// Newline-delimited; blank lines are skipped. Each line is decoded as
    /// lossy UTF-8 on its own.
    Lines,
}

/// Listens for the external peer and records one `GazeNotification` per
/// inbound message, payload verbatim.
pub struct GazeDetector {
    store: Arc<EventStore>,
    framing: Framing,
    chunk_size: usize,
}

impl GazeDetector {
    pub fn new(store: Arc<EventStore>, framing: Framing, chunk_size: usize) -> Self {
        Self {
            store,
            framing,
            chunk_size: chunk_size.max(1),
        }
    }

    pub async fn bind(addr: &str) -> Result<TcpListener, DetectorError> {
        TcpListener::bind(addr)
            .await
            .map_err(|source| DetectorError::Bind {
                addr: addr.to_string(),
                source,
            })
    }

    pub fn spawn(self, listener: TcpListener, token: CancellationToken) -> DetectorHandle {
        DetectorHandle::task("gaze", tokio::spawn(self.serve(listener, token)))
    }

    /// Accept loop. One connection at a time; a dropped or reset connection
    /// only ends that connection.
    pub async fn serve(self, listener: TcpListener, token: CancellationToken) {
        match listener.local_addr() {
            Ok(addr) => info!("Listening on {}", addr),
            Err(_) => info!("Listening for gaze notifications"),
        }

        loop {
            let accepted = tokio::select! {
                _ = token.cancelled() => break,
                accepted = listener.accept() => accepted,
            };
            match accepted {
                Ok((socket, peer)) => {
                    info!(%peer, "Connection from peer");
                    let received = self.handle_connection(socket, &token).await;
                    info!(%peer, received, "Peer connection closed");
                }
                Err(e) => warn!("Accept failed: {}", e),
            }
        }

        info!("Gaze detector stopped");
    }

    /// Reads messages until EOF, error or cancellation. Returns how many
    /// events were recorded.
    pub async fn handle_connection<R>(&self, reader: R, token: &CancellationToken) -> usize
    where
        R: AsyncRead + Unpin,
    {
        match self.framing {
            Framing::Chunk => self.read_chunks(reader, token).await,
            Framing::Lines => self.read_lines(reader, token).await,
        }
    }

    async fn read_chunks<R: AsyncRead + Unpin>(&self, mut reader: R, token: &CancellationToken) -> usize {
        let mut buf = vec![0u8; self.chunk_size];
        let mut received = 0;
        loop {
            let read = tokio::select! {
                _ = token.cancelled() => break,
                read = reader.read(&mut buf) => read,
            };
            match read {
                Ok(0) => break,
                Ok(n) => {
                    let message = String::from_utf8_lossy(&buf[..n]).into_owned();
                    if self.record(message) {
                        received += 1;
                    }
                }
                Err(e) => {
                    warn!("Peer connection error: {}", e);
                    break;
                }
            }
        }
        received
    }

    async fn read_lines<R: AsyncRead + Unpin>(&self, reader: R, token: &CancellationToken) -> usize {
        let mut reader = BufReader::new(reader);
        let mut line = Vec::new();
        let mut received = 0;
        loop {
            line.clear();
            let read = tokio::select! {
                _ = token.cancelled() => break,
                read = reader.read_until(b'\n', &mut line) => read,
            };
            match read {
                Ok(0) => break,
                Ok(_) => {
                    // Decoded per line: invalid bytes spoil one message, not the connection.
                    let text = String::from_utf8_lossy(&line);
                    let message = text.trim_end_matches(['\n', '\r']);
                    if message.trim().is_empty() {
                        continue;
                    }
                    if self.record(message.to_string()) {
                        received += 1;
                    }
                }
                Err(e) => {
                    warn!("Peer connection error: {}", e);
                    break;
                }
            }
        }
        received
    }

    fn record(&self, message: String) -> bool {
        debug!(len = message.len(), "Gaze notification received");
        match self
            .store
            .append(EventKind::GazeNotification, time::now(), Some(message))
        {
            Ok(_) => true,
            Err(e) => {
                warn!("Gaze notification rejected: {}", e);
                false
            }
        }
    }
}

use std::io::ErrorKind;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("peer at {0} refused the connection; is it listening?")]
    ConnectionRefused(String),
    #[error("connection to {0} was reset")]
    ConnectionReset(String),
    #[error("timed out reaching {0}")]
    Timeout(String),
    #[error("notification to {addr} failed: {source}")]
    Io {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

impl NotifyError {
    fn from_io(addr: &str, e: std::io::Error) -> Self {
        match e.kind() {
            ErrorKind::ConnectionRefused => NotifyError::ConnectionRefused(addr.to_string()),
            ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe => {
                NotifyError::ConnectionReset(addr.to_string())
            }
            _ => NotifyError::Io {
                addr: addr.to_string(),
                source: e,
            },
        }
    }
}

/// Outbound cue sender. One short-lived connection per message, like the
/// peer expects; failures are returned, never retried here.
#[derive(Debug, Clone)]
pub struct Notifier {
    peer_addr: String,
    timeout: Duration,
}

impl Notifier {
    pub fn new(peer_addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            peer_addr: peer_addr.into(),
            timeout,
        }
    }

    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    pub async fn send(&self, text: &str) -> Result<(), NotifyError> {
        match tokio::time::timeout(self.timeout, send_notification(text, &self.peer_addr)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(peer = %self.peer_addr, "Notification timed out");
                Err(NotifyError::Timeout(self.peer_addr.clone()))
            }
        }
    }
}

pub async fn send_notification(text: &str, addr: &str) -> Result<(), NotifyError> {
    let mut stream = TcpStream::connect(addr)
        .await
        .map_err(|e| NotifyError::from_io(addr, e))?;
    stream
        .write_all(text.as_bytes())
        .await
        .map_err(|e| NotifyError::from_io(addr, e))?;
    stream
        .shutdown()
        .await
        .map_err(|e| NotifyError::from_io(addr, e))?;
    info!(peer = %addr, bytes = text.len(), "Notification sent");
    Ok(())
}

//! In-process message transport

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

use crate::transport::Transport;
use crate::{ReadoutError, Result};

/// Transport fed from an in-process queue of message parts.
pub struct ChannelTransport {
    rx: mpsc::Receiver<Vec<u8>>,

    /// Part received by `poll` and not yet handed out by `recv`.
    pending: Option<Vec<u8>>,

    closed: bool,
}

/// Injects message parts into a [`ChannelTransport`].
#[derive(Debug, Clone)]
pub struct MessageSender {
    tx: mpsc::Sender<Vec<u8>>,
}

impl ChannelTransport {
    /// Create a transport and its sender with room for `capacity` queued parts.
    pub fn pair(capacity: usize) -> (Self, MessageSender) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { rx, pending: None, closed: false }, MessageSender { tx })
    }

    fn closed_error(&mut self) -> ReadoutError {
        if !self.closed {
            debug!("All message senders dropped");
            self.closed = true;
        }
        ReadoutError::transport_failed("channel transport closed")
    }
}

#[async_trait::async_trait]
impl Transport for ChannelTransport {
    async fn poll(&mut self, timeout: Duration) -> Result<bool> {
        if self.pending.is_some() {
            return Ok(true);
        }
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(part)) => {
                self.pending = Some(part);
                Ok(true)
            }
            Ok(None) => Err(self.closed_error()),
            Err(_) => Ok(false),
        }
    }

    async fn recv(&mut self) -> Result<Vec<u8>> {
        if let Some(part) = self.pending.take() {
            return Ok(part);
        }
        match self.rx.recv().await {
            Some(part) => Ok(part),
            None => Err(self.closed_error()),
        }
    }

    fn is_connected(&self) -> bool {
        !self.closed
    }

    fn describe(&self) -> String {
        "inproc://channel".to_string()
    }
}

impl MessageSender {
    /// Queue one message part.
    pub async fn send_part(&self, part: Vec<u8>) -> Result<()> {
        self.tx
            .send(part)
            .await
            .map_err(|_| ReadoutError::transport_failed("channel transport dropped"))
    }

    /// Queue a payload, preceded by a routing-identity part when given.
    pub async fn send_message(&self, identity: Option<&[u8]>, payload: &[u8]) -> Result<()> {
        if let Some(identity) = identity {
            self.send_part(identity.to_vec()).await?;
        }
        self.send_part(payload.to_vec()).await
    }

    /// Blocking variant of [`send_message`](Self::send_message) for synchronous callers.
    ///
    /// Must not be called from within an async runtime.
    pub fn blocking_send_message(&self, identity: Option<&[u8]>, payload: &[u8]) -> Result<()> {
        let dropped = |_| ReadoutError::transport_failed("channel transport dropped");
        if let Some(identity) = identity {
            self.tx.blocking_send(identity.to_vec()).map_err(dropped)?;
        }
        self.tx.blocking_send(payload.to_vec()).map_err(dropped)
    }
}

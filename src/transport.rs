//! Transport trait for front-end message sources

use std::time::Duration;

use crate::Result;

/// Message-delimited receive side of a front-end link.
///
/// A transport delivers opaque message parts. Identity-framed sources send a
/// routing-identity part before each payload part; the ingestion loop drains
/// it according to its [`LinkMode`](crate::config::LinkMode).
#[async_trait::async_trait]
pub trait Transport: Send + 'static {
    /// Wait up to `timeout` for a message part to become available.
    ///
    /// Returns:
    /// - `Ok(true)` - A part is ready; the next `recv` will not wait
    /// - `Ok(false)` - Nothing arrived within the timeout
    /// - `Err(e)` - The transport failed
    async fn poll(&mut self, timeout: Duration) -> Result<bool>;

    /// Receive the next message part.
    ///
    /// A zero-length part is a valid keepalive or connection notification.
    async fn recv(&mut self) -> Result<Vec<u8>>;

    /// Whether a peer is currently attached.
    fn is_connected(&self) -> bool;

    /// Endpoint description for logs and telemetry.
    fn describe(&self) -> String;

    /// Counter that changes whenever the byte stream restarts from a new peer.
    ///
    /// Bytes buffered from an earlier peer never continue into a later one's
    /// stream. Sources with a single uninterrupted stream keep the default.
    fn connection_epoch(&self) -> u64 {
        0
    }

    /// Drop resources tied to the worker's runtime before it shuts down.
    ///
    /// Called once at the end of every run; the transport must be able to
    /// reacquire them if the link is started again.
    async fn release(&mut self) {}
}

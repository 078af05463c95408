//! Raw TCP stream transport
//!
//! Front-end cards open a plain TCP connection and write frames as a byte
//! stream. The transport listens, serves one peer at a time and turns every
//! read into one message. In identity-framed mode each message is preceded by
//! a part holding the peer address. Connects and disconnects surface as
//! zero-length messages.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::transport::Transport;
use crate::{ReadoutError, Result};

const READ_BUFFER_BYTES: usize = 64 * 1024;

enum Listener {
    /// Bound but not registered with any runtime.
    Idle(std::net::TcpListener),
    Active(TcpListener),
}

/// Listening TCP transport for a single front-end card.
pub struct TcpTransport {
    addr: SocketAddr,
    identity_framed: bool,
    listener: Option<Listener>,
    peer: Option<(TcpStream, SocketAddr)>,
    accepted: u64,
    queue: VecDeque<Vec<u8>>,
    read_buf: Vec<u8>,
}

impl TcpTransport {
    /// Bind `addr` (e.g. `0.0.0.0:5556`; port 0 picks a free port).
    ///
    /// Binding happens immediately so address errors surface at configuration
    /// time; the socket joins the worker's runtime on first poll.
    pub fn bind(addr: &str, identity_framed: bool) -> Result<Self> {
        let listener = std::net::TcpListener::bind(addr).map_err(|e| {
            ReadoutError::transport_failed_with_source(format!("Failed to bind {addr}"), Box::new(e))
        })?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;
        info!(%addr, identity_framed, "TCP transport bound");

        Ok(Self {
            addr,
            identity_framed,
            listener: Some(Listener::Idle(listener)),
            peer: None,
            accepted: 0,
            queue: VecDeque::new(),
            read_buf: vec![0; READ_BUFFER_BYTES],
        })
    }

    /// Address the transport listens on.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    async fn listener(&mut self) -> Result<&TcpListener> {
        let active = match self.listener.take() {
            Some(Listener::Active(listener)) => listener,
            Some(Listener::Idle(listener)) => TcpListener::from_std(listener)?,
            None => TcpListener::bind(self.addr).await?,
        };
        let listener = self.listener.insert(Listener::Active(active));
        match listener {
            Listener::Active(listener) => Ok(listener),
            Listener::Idle(_) => Err(ReadoutError::transport_failed("listener not active")),
        }
    }

    fn push_message(&mut self, peer: SocketAddr, payload: Vec<u8>) {
        if self.identity_framed {
            self.queue.push_back(peer.to_string().into_bytes());
        }
        self.queue.push_back(payload);
    }

    /// Wait for one accept or read and queue what it produced.
    async fn fill(&mut self) -> Result<()> {
        if let Some((stream, peer)) = self.peer.as_mut() {
            let peer = *peer;
            let n = stream.read(&mut self.read_buf).await?;
            if n == 0 {
                info!(%peer, "Front-end disconnected");
                self.peer = None;
                self.push_message(peer, Vec::new());
            } else {
                let payload = self.read_buf[..n].to_vec();
                self.push_message(peer, payload);
            }
            return Ok(());
        }

        let (stream, peer) = self.listener().await?.accept().await?;
        stream.set_nodelay(true)?;
        info!(%peer, "Front-end connected");
        self.peer = Some((stream, peer));
        self.accepted += 1;
        self.push_message(peer, Vec::new());
        Ok(())
    }
}

#[async_trait::async_trait]
impl Transport for TcpTransport {
    async fn poll(&mut self, timeout: Duration) -> Result<bool> {
        if !self.queue.is_empty() {
            return Ok(true);
        }
        match tokio::time::timeout(timeout, self.fill()).await {
            Ok(Ok(())) => Ok(!self.queue.is_empty()),
            Ok(Err(e)) => {
                if let Some((_, peer)) = self.peer.take() {
                    warn!(%peer, "Dropping peer after read error: {}", e);
                }
                Err(e)
            }
            Err(_) => Ok(false),
        }
    }

    async fn recv(&mut self) -> Result<Vec<u8>> {
        loop {
            if let Some(part) = self.queue.pop_front() {
                return Ok(part);
            }
            self.fill().await?;
        }
    }

    fn is_connected(&self) -> bool {
        self.peer.is_some()
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.addr)
    }

    fn connection_epoch(&self) -> u64 {
        self.accepted
    }

    async fn release(&mut self) {
        if let Some((_, peer)) = self.peer.take() {
            debug!(%peer, "Closing peer connection");
        }
        self.queue.clear();
        self.listener = match self.listener.take() {
            Some(Listener::Active(listener)) => match listener.into_std() {
                Ok(listener) => Some(Listener::Idle(listener)),
                Err(e) => {
                    warn!("Failed to detach listener, will rebind on restart: {}", e);
                    None
                }
            },
            other => other,
        };
    }
}

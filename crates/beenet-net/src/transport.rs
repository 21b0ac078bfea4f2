//! Stream-oriented transport abstraction
//!
//! The core only assumes a reliable ordered byte stream per established
//! session and a negotiated application protocol name of exactly
//! `beenet/1`. Concrete transports (QUIC, TCP+TLS, WebRTC) plug in behind
//! the [`Transport`] trait; this module ships a plain TCP implementation
//! for the daemon and an in-memory pair for tests.

use crate::framing::{FrameCodec, FrameError};
use futures::{SinkExt, StreamExt};
use std::future::Future;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tracing::debug;

/// The application protocol every connection must negotiate.
pub const PROTOCOL_NAME: &str = "beenet/1";

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("connection closed")]
    Closed,
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
    #[error("negotiated protocol {0:?} is not {PROTOCOL_NAME:?}")]
    WrongProtocol(String),
}

/// A bidirectional reliable ordered byte stream carrying whole frames.
pub trait Connection: Send + 'static {
    /// Send one frame.
    fn send(&mut self, payload: Vec<u8>) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Receive the next frame; `None` on orderly close.
    fn recv(&mut self) -> impl Future<Output = Result<Option<Vec<u8>>, TransportError>> + Send;

    /// Close the connection.
    fn close(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Remote peer address.
    fn remote_addr(&self) -> SocketAddr;

    /// Negotiated application protocol name.
    fn protocol(&self) -> &'static str;
}

/// Accepts inbound connections.
pub trait Listener: Send + 'static {
    type Conn: Connection;

    /// Wait for the next inbound connection.
    fn accept(&mut self) -> impl Future<Output = Result<Self::Conn, TransportError>> + Send;

    /// The bound local address.
    fn local_addr(&self) -> Result<SocketAddr, TransportError>;
}

/// Factory for listeners and outbound connections.
pub trait Transport: Send + Sync + 'static {
    type Conn: Connection;
    type Listener: Listener<Conn = Self::Conn>;

    /// Bind a listener.
    fn listen(
        &self,
        addr: SocketAddr,
    ) -> impl Future<Output = Result<Self::Listener, TransportError>> + Send;

    /// Dial a remote peer.
    fn dial(
        &self,
        addr: SocketAddr,
    ) -> impl Future<Output = Result<Self::Conn, TransportError>> + Send;
}

// =============================================================================
// TCP
// =============================================================================

/// Plain TCP transport.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpTransport;

/// A framed TCP connection.
pub struct TcpConnection {
    framed: Framed<TcpStream, FrameCodec>,
    remote: SocketAddr,
}

/// TCP listener wrapper.
pub struct TcpListenerWrapper {
    inner: tokio::net::TcpListener,
}

impl Transport for TcpTransport {
    type Conn = TcpConnection;
    type Listener = TcpListenerWrapper;

    async fn listen(&self, addr: SocketAddr) -> Result<Self::Listener, TransportError> {
        let inner = tokio::net::TcpListener::bind(addr).await?;
        debug!(%addr, "tcp transport listening");
        Ok(TcpListenerWrapper { inner })
    }

    async fn dial(&self, addr: SocketAddr) -> Result<Self::Conn, TransportError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(TcpConnection {
            framed: Framed::new(stream, FrameCodec::new()),
            remote: addr,
        })
    }
}

impl Listener for TcpListenerWrapper {
    type Conn = TcpConnection;

    async fn accept(&mut self) -> Result<TcpConnection, TransportError> {
        let (stream, remote) = self.inner.accept().await?;
        stream.set_nodelay(true)?;
        Ok(TcpConnection {
            framed: Framed::new(stream, FrameCodec::new()),
            remote,
        })
    }

    fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.inner.local_addr()?)
    }
}

impl Connection for TcpConnection {
    async fn send(&mut self, payload: Vec<u8>) -> Result<(), TransportError> {
        self.framed.send(payload).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        match self.framed.next().await {
            Some(Ok(frame)) => Ok(Some(frame)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.framed.close().await?;
        Ok(())
    }

    fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    fn protocol(&self) -> &'static str {
        PROTOCOL_NAME
    }
}

// =============================================================================
// In-memory (tests and single-process swarms)
// =============================================================================

/// In-memory duplex connection backed by channels.
pub struct MemoryConnection {
    tx: mpsc::Sender<Vec<u8>>,
    rx: mpsc::Receiver<Vec<u8>>,
    remote: SocketAddr,
    closed: bool,
}

/// Create a connected pair of in-memory connections.
pub fn memory_pair() -> (MemoryConnection, MemoryConnection) {
    let (a_tx, a_rx) = mpsc::channel(64);
    let (b_tx, b_rx) = mpsc::channel(64);
    let addr: SocketAddr = ([127, 0, 0, 1], 0).into();
    (
        MemoryConnection {
            tx: a_tx,
            rx: b_rx,
            remote: addr,
            closed: false,
        },
        MemoryConnection {
            tx: b_tx,
            rx: a_rx,
            remote: addr,
            closed: false,
        },
    )
}

impl Connection for MemoryConnection {
    async fn send(&mut self, payload: Vec<u8>) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.tx
            .send(payload)
            .await
            .map_err(|_| TransportError::Closed)
    }

    async fn recv(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        if self.closed {
            return Ok(None);
        }
        Ok(self.rx.recv().await)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closed = true;
        self.rx.close();
        Ok(())
    }

    fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    fn protocol(&self) -> &'static str {
        PROTOCOL_NAME
    }
}

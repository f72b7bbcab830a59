//! Transport abstraction traits for Beacon.
//!
//! The server only talks to subscribers through these traits, which keeps
//! session logic independent of the wire protocol.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Connection timed out.
    #[error("Connection timed out")]
    Timeout,

    /// Opening handshake did not complete.
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Inbound message exceeded the configured limit.
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive data.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Something received from a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A text message.
    Text(String),
    /// A binary message, by length. Subscribers have nothing to say in binary.
    Binary(usize),
    /// A ping from the peer. The reply is the transport's job.
    Ping,
    /// A reply to one of our probes.
    Pong,
}

/// A transport that can accept subscriber connections.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Accept the next connection.
    ///
    /// Returns as soon as the peer is connected; the opening handshake is
    /// left to [`PendingConnection::handshake`].
    async fn accept(&self) -> Result<Box<dyn PendingConnection>, TransportError>;

    /// Get the transport name (e.g., "websocket").
    fn name(&self) -> &'static str;

    /// Address the transport is listening on.
    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }
}

/// An accepted peer whose handshake has not run yet.
#[async_trait]
pub trait PendingConnection: Send {
    /// Get the remote address, if available.
    fn remote_addr(&self) -> Option<String>;

    /// Complete the opening handshake.
    async fn handshake(self: Box<Self>) -> Result<Box<dyn Connection>, TransportError>;
}

/// An open connection to a single subscriber.
pub trait Connection: Send {
    /// Get the remote address, if available.
    fn remote_addr(&self) -> Option<String> {
        None
    }

    /// Separate the write half from the read half.
    fn split(self: Box<Self>) -> (Box<dyn ConnectionSink>, Box<dyn ConnectionStream>);
}

/// Write half of a connection.
#[async_trait]
pub trait ConnectionSink: Send {
    /// Send one text message.
    async fn send_text(&mut self, text: Arc<str>) -> Result<(), TransportError>;

    /// Send a liveness probe.
    async fn ping(&mut self) -> Result<(), TransportError>;

    /// Close the connection gracefully. Closing twice is not an error.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Read half of a connection.
#[async_trait]
pub trait ConnectionStream: Send {
    /// Receive the next message.
    ///
    /// Returns `None` once the peer has closed the connection.
    async fn recv(&mut self) -> Result<Option<Inbound>, TransportError>;
}

//! In-process transport.
//!
//! [`ChannelConnection::pair`] returns a connection plus the peer end, both
//! backed by tokio channels. Sessions run against it exactly as they would
//! against a socket, which makes liveness and eviction paths testable
//! without a network.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::traits::{Connection, ConnectionSink, ConnectionStream, Inbound, TransportError};

/// What the server side wrote, as seen by the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Written {
    Text(Arc<str>),
    Ping,
    Close,
}

/// Server side of an in-process connection.
pub struct ChannelConnection {
    outgoing: mpsc::UnboundedSender<Written>,
    incoming: mpsc::UnboundedReceiver<Inbound>,
    remote_addr: Option<String>,
}

/// Client side of an in-process connection.
pub struct ChannelPeer {
    /// Frames written by the server, in order.
    pub written: mpsc::UnboundedReceiver<Written>,
    inbound: Option<mpsc::UnboundedSender<Inbound>>,
}

impl ChannelConnection {
    /// Create a connected pair.
    #[must_use]
    pub fn pair(remote_addr: impl Into<String>) -> (Self, ChannelPeer) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        (
            Self {
                outgoing: out_tx,
                incoming: in_rx,
                remote_addr: Some(remote_addr.into()),
            },
            ChannelPeer {
                written: out_rx,
                inbound: Some(in_tx),
            },
        )
    }
}

impl ChannelPeer {
    /// Deliver a message to the server side.
    ///
    /// Returns `false` if the connection is gone.
    pub fn send(&self, message: Inbound) -> bool {
        self.inbound
            .as_ref()
            .is_some_and(|tx| tx.send(message).is_ok())
    }

    /// Close the peer's sending direction; the server's stream then ends.
    pub fn hang_up(&mut self) {
        self.inbound = None;
    }
}

impl Connection for ChannelConnection {
    fn remote_addr(&self) -> Option<String> {
        self.remote_addr.clone()
    }

    fn split(self: Box<Self>) -> (Box<dyn ConnectionSink>, Box<dyn ConnectionStream>) {
        let this = *self;
        (
            Box::new(ChannelSink {
                outgoing: this.outgoing,
                closed: false,
            }),
            Box::new(ChannelStream {
                incoming: this.incoming,
            }),
        )
    }
}

struct ChannelSink {
    outgoing: mpsc::UnboundedSender<Written>,
    closed: bool,
}

impl ChannelSink {
    fn write(&mut self, frame: Written) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::ConnectionClosed);
        }
        self.outgoing
            .send(frame)
            .map_err(|_| TransportError::ConnectionClosed)
    }
}

#[async_trait]
impl ConnectionSink for ChannelSink {
    async fn send_text(&mut self, text: Arc<str>) -> Result<(), TransportError> {
        self.write(Written::Text(text))
    }

    async fn ping(&mut self) -> Result<(), TransportError> {
        self.write(Written::Ping)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        // Peer may have gone already.
        let _ = self.write(Written::Close);
        self.closed = true;
        Ok(())
    }
}

struct ChannelStream {
    incoming: mpsc::UnboundedReceiver<Inbound>,
}

#[async_trait]
impl ConnectionStream for ChannelStream {
    async fn recv(&mut self) -> Result<Option<Inbound>, TransportError> {
        Ok(self.incoming.recv().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pair_carries_both_directions() {
        let (conn, mut peer) = ChannelConnection::pair("mem:1");
        let conn: Box<dyn Connection> = Box::new(conn);
        assert_eq!(conn.remote_addr().as_deref(), Some("mem:1"));

        let (mut sink, mut stream) = conn.split();

        sink.send_text(Arc::from("hi")).await.unwrap();
        sink.ping().await.unwrap();
        assert_eq!(peer.written.recv().await, Some(Written::Text(Arc::from("hi"))));
        assert_eq!(peer.written.recv().await, Some(Written::Ping));

        assert!(peer.send(Inbound::Pong));
        assert_eq!(stream.recv().await.unwrap(), Some(Inbound::Pong));

        peer.hang_up();
        assert!(!peer.send(Inbound::Pong));
        assert_eq!(stream.recv().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_close_then_send_fails() {
        let (conn, mut peer) = ChannelConnection::pair("mem:2");
        let (mut sink, _stream) = Box::new(conn).split();

        sink.close().await.unwrap();
        sink.close().await.unwrap();
        assert_eq!(peer.written.recv().await, Some(Written::Close));
        assert!(matches!(
            sink.send_text(Arc::from("x")).await,
            Err(TransportError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_send_to_dropped_peer_fails() {
        let (conn, peer) = ChannelConnection::pair("mem:3");
        let (mut sink, _stream) = Box::new(conn).split();
        drop(peer);

        assert!(sink.ping().await.is_err());
    }
}

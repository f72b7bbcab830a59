//! WebSocket transport implementation.
//!
//! This module provides a WebSocket-based transport using tokio-tungstenite.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Error as WsError, Message},
    WebSocketStream,
};
use tracing::{debug, info, warn};

use crate::traits::{
    Connection, ConnectionSink, ConnectionStream, Inbound, PendingConnection, Transport,
    TransportError,
};

/// Default port for subscriber connections.
pub const DEFAULT_PORT: u16 = 8081;

/// Default cap on inbound message size.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// WebSocket transport configuration.
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Maximum inbound message size in bytes.
    pub max_message_size: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

/// WebSocket transport.
pub struct WebSocketTransport {
    listener: TcpListener,
    config: WebSocketConfig,
}

impl WebSocketTransport {
    /// Create a new WebSocket transport.
    ///
    /// # Errors
    ///
    /// Returns an error if binding to the address fails.
    pub async fn new(config: WebSocketConfig) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        let local = listener.local_addr()?;

        info!("WebSocket transport listening on {}", local);

        Ok(Self { listener, config })
    }

    /// Create a new WebSocket transport with default limits.
    ///
    /// # Errors
    ///
    /// Returns an error if binding fails.
    pub async fn bind(addr: SocketAddr) -> Result<Self, TransportError> {
        Self::new(WebSocketConfig {
            bind_addr: addr,
            ..Default::default()
        })
        .await
    }

    #[must_use]
    pub fn config(&self) -> &WebSocketConfig {
        &self.config
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn accept(&self) -> Result<Box<dyn PendingConnection>, TransportError> {
        let (stream, addr) = self.listener.accept().await?;

        debug!("Accepted TCP connection from {}", addr);

        Ok(Box::new(PendingWebSocket {
            stream,
            remote_addr: addr,
            max_message_size: self.config.max_message_size,
        }))
    }

    fn name(&self) -> &'static str {
        "websocket"
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr().ok()
    }
}

/// A TCP peer that has not completed the WebSocket upgrade.
pub struct PendingWebSocket {
    stream: TcpStream,
    remote_addr: SocketAddr,
    max_message_size: usize,
}

#[async_trait]
impl PendingConnection for PendingWebSocket {
    fn remote_addr(&self) -> Option<String> {
        Some(self.remote_addr.to_string())
    }

    async fn handshake(self: Box<Self>) -> Result<Box<dyn Connection>, TransportError> {
        let ws_stream = accept_async(self.stream)
            .await
            .map_err(|e| TransportError::Handshake(e.to_string()))?;

        debug!("WebSocket handshake completed with {}", self.remote_addr);

        Ok(Box::new(WebSocketConnection {
            stream: ws_stream,
            remote_addr: self.remote_addr,
            max_message_size: self.max_message_size,
        }))
    }
}

/// An open WebSocket connection.
pub struct WebSocketConnection {
    stream: WebSocketStream<TcpStream>,
    remote_addr: SocketAddr,
    max_message_size: usize,
}

impl Connection for WebSocketConnection {
    fn remote_addr(&self) -> Option<String> {
        Some(self.remote_addr.to_string())
    }

    fn split(self: Box<Self>) -> (Box<dyn ConnectionSink>, Box<dyn ConnectionStream>) {
        let (sink, stream) = self.stream.split();
        (
            Box::new(WebSocketSink { sink, closed: false }),
            Box::new(WebSocketReceiver {
                stream,
                max_message_size: self.max_message_size,
            }),
        )
    }
}

/// Write half of a [`WebSocketConnection`].
pub struct WebSocketSink {
    sink: SplitSink<WebSocketStream<TcpStream>, Message>,
    closed: bool,
}

impl WebSocketSink {
    async fn send_message(&mut self, message: Message) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::ConnectionClosed);
        }
        self.sink.send(message).await.map_err(|e| match e {
            WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::ConnectionClosed,
            e => TransportError::SendFailed(e.to_string()),
        })
    }
}

#[async_trait]
impl ConnectionSink for WebSocketSink {
    async fn send_text(&mut self, text: Arc<str>) -> Result<(), TransportError> {
        self.send_message(Message::Text(text.to_string())).await
    }

    async fn ping(&mut self) -> Result<(), TransportError> {
        self.send_message(Message::Ping(Vec::new())).await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if std::mem::replace(&mut self.closed, true) {
            return Ok(());
        }

        match self.sink.close().await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(TransportError::Other(format!("Failed to close: {}", e))),
        }
    }
}

/// Read half of a [`WebSocketConnection`].
pub struct WebSocketReceiver {
    stream: SplitStream<WebSocketStream<TcpStream>>,
    max_message_size: usize,
}

#[async_trait]
impl ConnectionStream for WebSocketReceiver {
    async fn recv(&mut self) -> Result<Option<Inbound>, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    if text.len() > self.max_message_size {
                        warn!(
                            "Message too large: {} bytes (max: {})",
                            text.len(),
                            self.max_message_size
                        );
                        return Err(TransportError::MessageTooLarge {
                            size: text.len(),
                            max: self.max_message_size,
                        });
                    }
                    return Ok(Some(Inbound::Text(text)));
                }
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(Inbound::Binary(data.len())));
                }
                // tungstenite queues the pong itself
                Some(Ok(Message::Ping(_))) => return Ok(Some(Inbound::Ping)),
                Some(Ok(Message::Pong(_))) => return Ok(Some(Inbound::Pong)),
                Some(Ok(Message::Close(frame))) => {
                    debug!("Received close frame: {:?}", frame);
                    return Ok(None);
                }
                Some(Ok(Message::Frame(_))) => {}
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) | None => {
                    debug!("WebSocket stream ended");
                    return Ok(None);
                }
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
            }
        }
    }
}

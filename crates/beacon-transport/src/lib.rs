//! # beacon-transport
//!
//! Transport abstraction for Beacon subscriber connections.
//!
//! - **WebSocket** - What subscribers actually connect with
//! - **Channel** - In-process pair, for driving sessions without sockets
//!
//! ## Transport Abstraction
//!
//! A [`Transport`] hands out [`PendingConnection`]s from its accept loop. The
//! handshake runs separately, so a slow client never stalls accepting. Once
//! open, a [`Connection`] splits into a sink and a stream that a session can
//! drive concurrently.
//!
//! ```rust,ignore
//! use beacon_transport::{Inbound, Transport};
//!
//! let pending = transport.accept().await?;
//! tokio::spawn(async move {
//!     let conn = pending.handshake().await?;
//!     let (mut sink, mut stream) = conn.split();
//!     while let Some(Inbound::Text(text)) = stream.recv().await? {
//!         sink.send_text(text.into()).await?;
//!     }
//! });
//! ```

pub mod channel;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use channel::{ChannelConnection, ChannelPeer, Written};
pub use traits::{
    Connection, ConnectionSink, ConnectionStream, Inbound, PendingConnection, Transport,
    TransportError,
};

#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConfig, WebSocketTransport};

//! Subscriber sessions.
//!
//! Each session task owns its connection. It registers a [`Subscriber`]
//! handle once the handshake completes, then multiplexes three sources until
//! one of them ends the session: frames queued in the outbox, a close
//! request from the registry, and inbound traffic. Teardown always runs the
//! same path and removes the subscriber exactly once.

use std::sync::Arc;
use std::time::Duration;

use beacon_core::{Outbound, Outbox, Subscriber, SubscriberId, SubscriberRegistry};
use beacon_transport::{Connection, Inbound, PendingConnection};
use tracing::{debug, info, trace, warn};

use crate::metrics::SubscriberMetricsGuard;

/// Inbound text is logged up to this many characters.
const TEXT_PREVIEW: usize = 50;

/// Upper bound on the closing handshake during teardown.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The peer closed the connection.
    PeerClosed,
    /// The registry asked the session to close (eviction or shutdown).
    Evicted,
    /// Reading from the connection failed.
    ReadFailed,
    /// Writing to the connection failed.
    WriteFailed,
}

/// Handshake a freshly accepted connection and serve it.
pub async fn run_session(
    pending: Box<dyn PendingConnection>,
    id: SubscriberId,
    registry: Arc<SubscriberRegistry>,
    outbox_capacity: usize,
) {
    let (subscriber, outbox) = Subscriber::new(id, outbox_capacity, pending.remote_addr());
    debug!(subscriber = %id, "Handshaking");

    let conn = match pending.handshake().await {
        Ok(conn) => conn,
        Err(e) => {
            warn!(subscriber = %id, error = %e, "Handshake failed");
            subscriber.mark_closed();
            return;
        }
    };

    serve(conn, subscriber, outbox, registry).await;
}

/// Run an open connection as `subscriber` until it ends.
///
/// Registration moves the subscriber from `Handshaking` to `Open`.
pub async fn serve(
    conn: Box<dyn Connection>,
    subscriber: Arc<Subscriber>,
    mut outbox: Outbox,
    registry: Arc<SubscriberRegistry>,
) -> SessionEnd {
    let id = subscriber.id();
    let (mut sink, mut stream) = conn.split();

    registry.register(Arc::clone(&subscriber));
    let _metrics_guard = SubscriberMetricsGuard::new();

    let end = loop {
        tokio::select! {
            biased;

            _ = subscriber.closed() => break SessionEnd::Evicted,

            queued = outbox.recv() => {
                let write = match queued {
                    Some(Outbound::Event(text)) => sink.send_text(text),
                    Some(Outbound::Probe) => sink.ping(),
                    None => break SessionEnd::Evicted,
                };
                // A peer that stops reading can stall the write; eviction still wins.
                let sent = tokio::select! {
                    biased;

                    _ = subscriber.closed() => break SessionEnd::Evicted,
                    sent = write => sent,
                };
                if let Err(e) = sent {
                    warn!(subscriber = %id, error = %e, "Write failed");
                    break SessionEnd::WriteFailed;
                }
            }

            inbound = stream.recv() => match inbound {
                Ok(Some(message)) => {
                    subscriber.touch();
                    match message {
                        Inbound::Text(text) => {
                            debug!(subscriber = %id, text = preview(&text, TEXT_PREVIEW), "Received text");
                        }
                        Inbound::Binary(len) => debug!(subscriber = %id, bytes = len, "Received binary"),
                        Inbound::Ping => trace!(subscriber = %id, "Received ping"),
                        Inbound::Pong => trace!(subscriber = %id, "Received pong"),
                    }
                }
                Ok(None) => break SessionEnd::PeerClosed,
                Err(e) => {
                    warn!(subscriber = %id, error = %e, "Read failed");
                    break SessionEnd::ReadFailed;
                }
            },
        }
    };

    subscriber.begin_close();
    registry.unregister(id);
    match tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(subscriber = %id, error = %e, "Close failed"),
        Err(_) => debug!(subscriber = %id, "Close timed out"),
    }
    subscriber.mark_closed();

    info!(
        subscriber = %id,
        reason = ?end,
        connected_ms = subscriber.age().as_millis() as u64,
        "Subscriber session closed"
    );
    end
}

/// The first `max_chars` characters of `text`.
fn preview(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

//! Shared helpers for Beacon benchmarks.

use std::net::SocketAddr;
use std::sync::Arc;

use beacon_core::{Outbox, Subscriber, SubscriberRegistry};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Register `count` subscribers with outboxes of `capacity` frames.
///
/// The returned outboxes must be kept alive, or sends to them fail.
#[must_use]
pub fn populate(registry: &SubscriberRegistry, count: usize, capacity: usize) -> Vec<Outbox> {
    (0..count)
        .map(|_| {
            let (subscriber, outbox) = Subscriber::new(registry.next_id(), capacity, None);
            registry.register(Arc::clone(&subscriber));
            outbox
        })
        .collect()
}

/// Discard everything queued in `outboxes`, returning how many frames there were.
pub fn drain_outboxes(outboxes: &mut [Outbox]) -> usize {
    let mut drained = 0;
    for outbox in outboxes {
        while outbox.try_recv().is_ok() {
            drained += 1;
        }
    }
    drained
}

/// Submit one event over a fresh connection and return the status code.
///
/// # Errors
///
/// Returns an error if the exchange fails or the reply has no status line.
pub async fn post_event(addr: SocketAddr, event_type: &str, data: &Value) -> std::io::Result<u16> {
    let body = serde_json::json!({ "type": event_type, "data": data }).to_string();
    let request = format!(
        "POST /api/event HTTP/1.1\r\nHost: {addr}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    );

    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(request.as_bytes()).await?;

    let mut reply = Vec::with_capacity(256);
    stream.read_to_end(&mut reply).await?;

    parse_status(&reply).ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidData, "Missing HTTP status line")
    })
}

/// Status code from the first line of an HTTP reply.
#[must_use]
pub fn parse_status(reply: &[u8]) -> Option<u16> {
    let line = reply.split(|&b| b == b'\r').next()?;
    let line = std::str::from_utf8(line).ok()?;
    line.split(' ').nth(1)?.parse().ok()
}

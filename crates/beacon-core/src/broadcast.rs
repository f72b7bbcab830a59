//! Queue-to-subscriber fan-out.
//!
//! One [`BroadcastLoop::tick`] drains the whole queue and pushes every event,
//! oldest first, to the subscribers registered at the moment that event is
//! sent. Sends never wait: a subscriber whose outbox is full or closed is
//! evicted and the rest still receive the event.

use std::sync::Arc;

use tracing::{debug, error, trace, warn};

use crate::queue::EventQueue;
use crate::registry::SubscriberRegistry;

/// What one tick did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Events drained from the queue.
    pub events: usize,
    /// Successful hand-offs to subscriber outboxes.
    pub deliveries: usize,
    /// Events drained while no subscriber was connected.
    pub dropped: usize,
    /// Subscribers removed because a send failed.
    pub evicted: usize,
}

/// Drains the event queue into the subscriber registry.
#[derive(Debug, Clone)]
pub struct BroadcastLoop {
    queue: Arc<EventQueue>,
    registry: Arc<SubscriberRegistry>,
}

impl BroadcastLoop {
    /// Create a broadcast loop over a shared queue and registry.
    #[must_use]
    pub fn new(queue: Arc<EventQueue>, registry: Arc<SubscriberRegistry>) -> Self {
        Self { queue, registry }
    }

    #[must_use]
    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    /// Flush every pending event to the current subscribers.
    pub fn tick(&self) -> TickReport {
        let events = self.queue.drain();
        let mut report = TickReport {
            events: events.len(),
            ..TickReport::default()
        };

        for event in events {
            let recipients = self.registry.snapshot();
            if recipients.is_empty() {
                warn!(event_type = event.event_type(), "No subscribers connected, dropping event");
                report.dropped += 1;
                continue;
            }

            debug!(
                event_type = event.event_type(),
                recipients = recipients.len(),
                "Broadcasting event"
            );

            let frame = match event.encode() {
                Ok(frame) => frame,
                Err(e) => {
                    error!(error = %e, "Failed to encode event");
                    continue;
                }
            };

            for subscriber in &recipients {
                match subscriber.send(Arc::clone(&frame)) {
                    Ok(()) => {
                        trace!(subscriber = %subscriber.id(), bytes = frame.len(), "Queued event");
                        report.deliveries += 1;
                    }
                    Err(e) => {
                        warn!(subscriber = %subscriber.id(), error = %e, "Send failed, evicting subscriber");
                        if self.registry.evict(subscriber.id()) {
                            report.evicted += 1;
                        }
                    }
                }
            }
        }

        report
    }
}

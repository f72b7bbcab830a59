//! FIFO handoff between ingestion and broadcast.
//!
//! Producers push from the ingestion side; the broadcast tick drains the
//! whole queue in one step. Both operations take the same short lock, so a
//! push racing a drain lands either in the drained batch or in the next one.

use std::collections::VecDeque;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

use crate::event::Event;

/// Queue errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The queue holds `capacity` events already.
    #[error("Event queue is full ({0} pending)")]
    Full(usize),
}

/// Pending events awaiting broadcast.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: Mutex<VecDeque<Event>>,
    /// Maximum pending events, 0 for unbounded.
    capacity: usize,
}

impl EventQueue {
    /// Create an unbounded queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a queue that rejects pushes beyond `capacity` pending events.
    ///
    /// A capacity of 0 means unbounded.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::new()),
            capacity,
        }
    }

    /// Maximum pending events, `None` if unbounded.
    #[must_use]
    pub fn capacity(&self) -> Option<usize> {
        (self.capacity > 0).then_some(self.capacity)
    }

    /// Append an event.
    ///
    /// Returns the queue depth after the push.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Full`] if the queue is at capacity.
    pub fn push(&self, event: Event) -> Result<usize, QueueError> {
        let mut events = self.events.lock();
        if self.capacity > 0 && events.len() >= self.capacity {
            return Err(QueueError::Full(events.len()));
        }

        let event_type = event.event_type().to_owned();
        events.push_back(event);
        let depth = events.len();
        drop(events);

        debug!(event_type = %event_type, depth, "Event queued");
        Ok(depth)
    }

    /// Take every pending event, oldest first.
    #[must_use]
    pub fn drain(&self) -> Vec<Event> {
        let drained = std::mem::take(&mut *self.events.lock());
        if !drained.is_empty() {
            debug!(count = drained.len(), "Drained event queue");
        }
        drained.into()
    }

    /// Number of pending events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Discard every pending event, returning how many were dropped.
    pub fn clear(&self) -> usize {
        let mut events = self.events.lock();
        let count = events.len();
        events.clear();
        count
    }
}

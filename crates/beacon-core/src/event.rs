//! The event type flowing from ingestion to subscribers.

use std::sync::Arc;

use beacon_protocol::{codec, EventFrame, ProtocolError};
use chrono::{SecondsFormat, Utc};
use serde_json::Value;

/// Current UTC time as ISO-8601 with millisecond precision.
///
/// Example: `2026-03-01T12:00:00.123Z`.
#[must_use]
pub fn iso8601_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// An accepted event.
///
/// Immutable once built; the timestamp is assigned by the server, never by
/// the producer.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    event_type: String,
    timestamp: String,
    payload: Value,
}

impl Event {
    /// Create an event stamped with the current time.
    #[must_use]
    pub fn new(event_type: impl Into<String>, payload: Value) -> Self {
        Self::with_timestamp(event_type, iso8601_now(), payload)
    }

    /// Create an event with an explicit timestamp.
    #[must_use]
    pub fn with_timestamp(
        event_type: impl Into<String>,
        timestamp: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            timestamp: timestamp.into(),
            payload,
        }
    }

    #[must_use]
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    #[must_use]
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Consume the event into its wire frame.
    #[must_use]
    pub fn into_frame(self) -> EventFrame {
        EventFrame {
            event_type: self.event_type,
            timestamp: self.timestamp,
            payload: self.payload,
        }
    }

    /// Serialize to the canonical text pushed to subscribers.
    ///
    /// The result is shared between every recipient of the event.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized.
    pub fn encode(self) -> Result<Arc<str>, ProtocolError> {
        codec::encode_event(&self.into_frame()).map(Arc::from)
    }
}

//! JSON bodies exchanged by Beacon.
//!
//! [`EventFrame`] is the canonical form pushed to every subscriber.
//! [`Ack`] and [`ErrorReply`] are the ingestion endpoint's response bodies.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Message returned in every successful acknowledgement.
pub const ACCEPTED_MESSAGE: &str = "Event received and queued for broadcast";

/// An event as it travels to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFrame {
    /// Event type chosen by the producer.
    #[serde(rename = "type")]
    pub event_type: String,
    /// ISO-8601 acceptance time, millisecond precision.
    pub timestamp: String,
    /// Opaque payload, copied verbatim from the submission's `data`.
    pub payload: Value,
}

impl EventFrame {
    /// Create a new event frame.
    #[must_use]
    pub fn new(event_type: impl Into<String>, timestamp: impl Into<String>, payload: Value) -> Self {
        Self {
            event_type: event_type.into(),
            timestamp: timestamp.into(),
            payload,
        }
    }
}

/// Outcome marker carried by every ingestion reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    Success,
    Error,
}

/// Acknowledgement for an accepted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    pub status: ReplyStatus,
    pub message: String,
    pub event_type: String,
    pub timestamp: String,
}

impl Ack {
    /// Acknowledge an event of the given type accepted at `timestamp`.
    #[must_use]
    pub fn accepted(event_type: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::Success,
            message: ACCEPTED_MESSAGE.to_string(),
            event_type: event_type.into(),
            timestamp: timestamp.into(),
        }
    }
}

/// Error body returned for rejected or failed requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReply {
    pub status: ReplyStatus,
    pub message: String,
}

impl ErrorReply {
    /// Create a new error reply.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::Error,
            message: message.into(),
        }
    }
}

/// A validated `POST /api/event` body.
#[derive(Debug, Clone, PartialEq)]
pub struct EventSubmission {
    /// Value of the `type` field.
    pub event_type: String,
    /// Value of the `data` field, untouched.
    pub data: Value,
}

/// Reasons a submission body is rejected.
///
/// The `Display` text is sent to the caller as the error message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmissionError {
    #[error("Request body is empty")]
    Empty,

    #[error("Invalid JSON format: {0}")]
    InvalidJson(String),

    #[error("Missing 'type' or 'data' field")]
    MissingField,

    #[error("Field 'type' must be a non-empty string")]
    InvalidType,
}

impl EventSubmission {
    /// Validate an already-parsed JSON document.
    ///
    /// Presence is what matters: `"data": null` is a valid payload.
    ///
    /// # Errors
    ///
    /// Returns [`SubmissionError::MissingField`] when the document is not an
    /// object or lacks either field, and [`SubmissionError::InvalidType`] when
    /// `type` is not a non-empty string.
    pub fn from_value(value: Value) -> Result<Self, SubmissionError> {
        let Value::Object(mut fields) = value else {
            return Err(SubmissionError::MissingField);
        };

        let (Some(event_type), Some(data)) = (fields.remove("type"), fields.remove("data")) else {
            return Err(SubmissionError::MissingField);
        };

        match event_type {
            Value::String(event_type) if !event_type.is_empty() => Ok(Self { event_type, data }),
            _ => Err(SubmissionError::InvalidType),
        }
    }
}

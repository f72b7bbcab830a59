//! Encoding and decoding helpers for Beacon bodies.
//!
//! Event frames travel to subscribers as JSON text messages; ingestion
//! bodies arrive as JSON inside an HTTP request.

use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

use crate::frames::{EventFrame, EventSubmission, SubmissionError};
use crate::http::StatusCode;

/// Protocol errors that can occur while framing or encoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The request head grew past the configured limit.
    #[error("Request head of {0} bytes exceeds the limit")]
    HeaderTooLarge(usize),

    /// The declared body length is past the configured limit.
    #[error("Request body of {0} bytes exceeds the limit")]
    BodyTooLarge(usize),

    /// The request line could not be split into method and target.
    #[error("Malformed request line: {0}")]
    MalformedRequestLine(String),

    /// A header line without a name or separator.
    #[error("Invalid header line: {0}")]
    InvalidHeader(String),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProtocolError {
    /// The status a server should answer with for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            ProtocolError::HeaderTooLarge(_) => StatusCode::RequestHeaderFieldsTooLarge,
            ProtocolError::BodyTooLarge(_) => StatusCode::PayloadTooLarge,
            ProtocolError::MalformedRequestLine(_) | ProtocolError::InvalidHeader(_) => {
                StatusCode::BadRequest
            }
            ProtocolError::Json(_) => StatusCode::InternalServerError,
        }
    }
}

/// Encode an event frame into the text sent to subscribers.
///
/// # Errors
///
/// Returns an error if the payload cannot be serialized.
pub fn encode_event(frame: &EventFrame) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(frame)?)
}

/// Decode an event frame received by a subscriber.
///
/// # Errors
///
/// Returns an error if the text is not a valid event frame.
pub fn decode_event(text: &str) -> Result<EventFrame, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}

/// Serialize any reply body to JSON bytes.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_json<T: Serialize>(body: &T) -> Result<Bytes, ProtocolError> {
    Ok(Bytes::from(serde_json::to_vec(body)?))
}

/// Parse and validate a `POST /api/event` body.
///
/// # Errors
///
/// Returns a [`SubmissionError`] whose text is suitable for the caller.
pub fn decode_submission(body: &[u8]) -> Result<EventSubmission, SubmissionError> {
    if body.is_empty() {
        return Err(SubmissionError::Empty);
    }

    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| SubmissionError::InvalidJson(e.to_string()))?;

    EventSubmission::from_value(value)
}

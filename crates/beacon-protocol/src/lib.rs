//! # beacon-protocol
//!
//! Wire formats for the Beacon event broadcast server.
//!
//! This crate knows nothing about sockets or tasks. It defines:
//!
//! - `http` - Incremental HTTP/1.1 request decoder and response encoder
//!   used by the ingestion endpoint
//! - `frames` - JSON bodies: the event frame pushed to subscribers, the
//!   ingestion acknowledgement and the error reply
//! - `codec` - Encoding/decoding helpers and the protocol error type
//!
//! ## Example
//!
//! ```rust
//! use beacon_protocol::{codec, http::RequestDecoder};
//! use bytes::BytesMut;
//!
//! let mut decoder = RequestDecoder::default();
//! let mut buf = BytesMut::from(
//!     &b"POST /api/event HTTP/1.1\r\nContent-Length: 31\r\n\r\n{\"type\":\"alert\",\"data\":{\"x\":1}}"[..],
//! );
//!
//! let request = decoder.decode(&mut buf).unwrap().unwrap();
//! assert_eq!(request.method, "POST");
//!
//! let submission = codec::decode_submission(&request.body).unwrap();
//! assert_eq!(submission.event_type, "alert");
//! ```

pub mod codec;
pub mod frames;
pub mod http;

pub use codec::{decode_event, decode_submission, encode_event, ProtocolError};
pub use frames::{Ack, ErrorReply, EventFrame, EventSubmission, ReplyStatus, SubmissionError};
pub use http::{Limits, Request, RequestDecoder, Response, StatusCode};

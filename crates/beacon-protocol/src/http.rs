//! Minimal HTTP/1.1 framing for the ingestion endpoint.
//!
//! The decoder is fed from a growing [`BytesMut`] and is safe to call after
//! every read: it returns `Ok(None)` until a whole request (head plus
//! `Content-Length` bytes of body) is buffered. Anything after that request
//! stays in the buffer untouched.
//!
//! Only what the ingestion endpoint needs is supported: one request per
//! connection, bodies delimited by `Content-Length`, no chunked encoding.

use std::borrow::Cow;
use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;
use tracing::warn;

use crate::codec::{encode_json, ProtocolError};

/// Default maximum size of the request line plus headers (8 KiB).
pub const DEFAULT_MAX_HEADER_SIZE: usize = 8 * 1024;

/// Default maximum body size (1 MiB).
pub const DEFAULT_MAX_BODY_SIZE: usize = 1024 * 1024;

/// Separator between the request head and the body.
const HEAD_DELIMITER: &[u8] = b"\r\n\r\n";

/// Size bounds enforced while decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum size of the head, delimiter included.
    pub max_header_size: usize,
    /// Maximum accepted `Content-Length`.
    pub max_body_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_header_size: DEFAULT_MAX_HEADER_SIZE,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

/// A fully buffered request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub target: String,
    pub version: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl Request {
    /// Look up a header value by case-insensitive name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// The first `max` bytes of the body as text, for logging.
    #[must_use]
    pub fn body_preview(&self, max: usize) -> Cow<'_, str> {
        let end = self.body.len().min(max);
        String::from_utf8_lossy(&self.body[..end])
    }
}

/// Parsed request line and headers, waiting for the body.
#[derive(Debug, Clone)]
struct RequestHead {
    method: String,
    target: String,
    version: String,
    headers: Vec<(String, String)>,
    content_length: usize,
}

#[derive(Debug)]
enum DecodeState {
    /// Looking for the head delimiter; `scanned` bytes were already searched.
    Head { scanned: usize },
    /// Head parsed, waiting for `content_length` body bytes.
    Body(RequestHead),
}

impl Default for DecodeState {
    fn default() -> Self {
        DecodeState::Head { scanned: 0 }
    }
}

/// Incremental request decoder.
///
/// After an error the decoder should be discarded together with its buffer.
#[derive(Debug, Default)]
pub struct RequestDecoder {
    limits: Limits,
    state: DecodeState,
}

impl RequestDecoder {
    /// Create a decoder with the given limits.
    #[must_use]
    pub fn new(limits: Limits) -> Self {
        Self {
            limits,
            state: DecodeState::default(),
        }
    }

    /// The limits this decoder enforces.
    #[must_use]
    pub fn limits(&self) -> Limits {
        self.limits
    }

    /// Try to decode one request from the buffer, consuming it on success.
    ///
    /// Returns `Ok(Some(request))` once complete, `Ok(None)` if more data is
    /// needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the head or body exceeds the limits, or the head
    /// is malformed.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Request>, ProtocolError> {
        if let DecodeState::Head { scanned } = self.state {
            match self.decode_head(buf, scanned)? {
                Some(head) => self.state = DecodeState::Body(head),
                None => {
                    self.state = DecodeState::Head { scanned: buf.len() };
                    return Ok(None);
                }
            }
        }

        match std::mem::take(&mut self.state) {
            DecodeState::Body(head) if buf.len() >= head.content_length => {
                let body = buf.split_to(head.content_length).freeze();
                Ok(Some(Request {
                    method: head.method,
                    target: head.target,
                    version: head.version,
                    headers: head.headers,
                    body,
                }))
            }
            state => {
                self.state = state;
                Ok(None)
            }
        }
    }

    fn decode_head(
        &self,
        buf: &mut BytesMut,
        scanned: usize,
    ) -> Result<Option<RequestHead>, ProtocolError> {
        // Step back so a delimiter split across two reads is still found.
        let start = scanned.saturating_sub(HEAD_DELIMITER.len() - 1);

        let Some(offset) = find(&buf[start..], HEAD_DELIMITER) else {
            if buf.len() > self.limits.max_header_size {
                return Err(ProtocolError::HeaderTooLarge(buf.len()));
            }
            return Ok(None);
        };

        let head_len = start + offset + HEAD_DELIMITER.len();
        if head_len > self.limits.max_header_size {
            return Err(ProtocolError::HeaderTooLarge(head_len));
        }

        let raw = buf.split_to(head_len);
        let head = parse_head(&raw[..head_len - HEAD_DELIMITER.len()])?;

        if head.content_length > self.limits.max_body_size {
            return Err(ProtocolError::BodyTooLarge(head.content_length));
        }

        Ok(Some(head))
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn parse_head(raw: &[u8]) -> Result<RequestHead, ProtocolError> {
    let text = std::str::from_utf8(raw)
        .map_err(|_| ProtocolError::MalformedRequestLine("request head is not UTF-8".into()))?;

    let mut lines = text.split("\r\n");
    let request_line = lines.next().unwrap_or_default();

    let mut parts = request_line.split(' ').filter(|part| !part.is_empty());
    let (Some(method), Some(target)) = (parts.next(), parts.next()) else {
        return Err(ProtocolError::MalformedRequestLine(request_line.to_string()));
    };
    let version = parts.next().unwrap_or("HTTP/1.0");

    if !method.bytes().all(|b| b.is_ascii_uppercase()) || !version.starts_with("HTTP/") {
        return Err(ProtocolError::MalformedRequestLine(request_line.to_string()));
    }

    let mut headers = Vec::new();
    for line in lines.filter(|line| !line.is_empty()) {
        let Some((name, value)) = line.split_once(':') else {
            return Err(ProtocolError::InvalidHeader(line.to_string()));
        };
        let name = name.trim();
        if name.is_empty() {
            return Err(ProtocolError::InvalidHeader(line.to_string()));
        }
        headers.push((name.to_string(), value.trim_matches([' ', '\t']).to_string()));
    }

    let content_length = headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .map_or(0, |(_, value)| {
            value.parse::<usize>().unwrap_or_else(|_| {
                warn!(value = %value, "Could not parse Content-Length, treating as zero");
                0
            })
        });

    Ok(RequestHead {
        method: method.to_string(),
        target: target.to_string(),
        version: version.to_string(),
        headers,
        content_length,
    })
}

/// Response status codes used by the ingestion endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum StatusCode {
    Ok = 200,
    BadRequest = 400,
    NotFound = 404,
    PayloadTooLarge = 413,
    RequestHeaderFieldsTooLarge = 431,
    InternalServerError = 500,
    ServiceUnavailable = 503,
}

impl StatusCode {
    /// Numeric code.
    #[must_use]
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Canonical reason phrase.
    #[must_use]
    pub fn reason(self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::NotFound => "Not Found",
            StatusCode::PayloadTooLarge => "Payload Too Large",
            StatusCode::RequestHeaderFieldsTooLarge => "Request Header Fields Too Large",
            StatusCode::InternalServerError => "Internal Server Error",
            StatusCode::ServiceUnavailable => "Service Unavailable",
        }
    }

    /// Whether this is a 4xx code.
    #[must_use]
    pub fn is_client_error(self) -> bool {
        (400..500).contains(&self.as_u16())
    }
}

impl From<StatusCode> for u16 {
    fn from(status: StatusCode) -> u16 {
        status.as_u16()
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.reason())
    }
}

/// A response, always sent with `Connection: close`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: StatusCode,
    content_type: &'static str,
    body: Bytes,
}

impl Response {
    /// A `text/plain` response.
    #[must_use]
    pub fn text(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: Bytes::from(body.into()),
        }
    }

    /// An `application/json` response.
    ///
    /// # Errors
    ///
    /// Returns an error if the body cannot be serialized.
    pub fn json<T: Serialize>(status: StatusCode, body: &T) -> Result<Self, ProtocolError> {
        Ok(Self {
            status,
            content_type: "application/json",
            body: encode_json(body)?,
        })
    }

    /// A plain response carrying the status' reason phrase as its body.
    #[must_use]
    pub fn reason(status: StatusCode) -> Self {
        Self::text(status, status.reason())
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn content_type(&self) -> &'static str {
        self.content_type
    }

    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Serialize status line, headers and body.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let head = format!(
            "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            self.status,
            self.content_type,
            self.body.len()
        );

        let mut buf = BytesMut::with_capacity(head.len() + self.body.len());
        buf.put_slice(head.as_bytes());
        buf.put_slice(&self.body);
        buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::ErrorReply;

    const POST: &[u8] =
        b"POST /api/event HTTP/1.1\r\nHost: localhost\r\nContent-Length: 31\r\n\r\n{\"type\":\"alert\",\"data\":{\"x\":1}}";

    #[test]
    fn test_decode_complete_request() {
        let mut decoder = RequestDecoder::default();
        let mut buf = BytesMut::from(POST);

        let request = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(request.method, "POST");
        assert_eq!(request.target, "/api/event");
        assert_eq!(request.version, "HTTP/1.1");
        assert_eq!(request.header("host"), Some("localhost"));
        assert_eq!(&request.body[..], br#"{"type":"alert","data":{"x":1}}"#);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_byte_by_byte() {
        let mut decoder = RequestDecoder::default();
        let mut buf = BytesMut::new();

        let (last, rest) = POST.split_last().unwrap();
        for byte in rest {
            buf.put_u8(*byte);
            assert!(decoder.decode(&mut buf).unwrap().is_none());
        }

        buf.put_u8(*last);
        let request = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(request.body.len(), 31);
    }

    #[test]
    fn test_decode_head_then_body() {
        let mut decoder = RequestDecoder::default();
        let split = POST.len() - 31;

        let mut buf = BytesMut::from(&POST[..split]);
        assert!(decoder.decode(&mut buf).unwrap().is_none());
        // The head is consumed even though the body is still missing.
        assert!(buf.is_empty());

        buf.extend_from_slice(&POST[split..split + 10]);
        assert!(decoder.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&POST[split + 10..]);
        assert!(decoder.decode(&mut buf).unwrap().is_some());
    }

    #[test]
    fn test_content_length_case_insensitive() {
        let mut decoder = RequestDecoder::default();
        let mut buf = BytesMut::from(&b"POST /api/event HTTP/1.1\r\ncOnTeNt-LeNgTh:\t4 \r\n\r\nabcd"[..]);

        let request = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&request.body[..], b"abcd");
    }

    #[test]
    fn test_malformed_content_length_is_zero() {
        let mut decoder = RequestDecoder::default();
        let mut buf = BytesMut::from(&b"POST /api/event HTTP/1.1\r\nContent-Length: abc\r\n\r\n{}"[..]);

        let request = decoder.decode(&mut buf).unwrap().unwrap();
        assert!(request.body.is_empty());
        // Trailing bytes are left for the caller to ignore.
        assert_eq!(&buf[..], b"{}");
    }

    #[test]
    fn test_missing_content_length_is_zero() {
        let mut decoder = RequestDecoder::default();
        let mut buf = BytesMut::from(&b"GET / HTTP/1.1\r\nHost: x\r\n\r\n"[..]);

        let request = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(request.method, "GET");
        assert_eq!(request.target, "/");
        assert!(request.body.is_empty());
    }

    #[test]
    fn test_second_request_left_in_buffer() {
        let mut decoder = RequestDecoder::default();
        let mut buf = BytesMut::from(&b"GET / HTTP/1.1\r\n\r\nGET /other HTTP/1.1\r\n\r\n"[..]);

        let first = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first.target, "/");
        assert_eq!(&buf[..], b"GET /other HTTP/1.1\r\n\r\n");
    }

    #[test]
    fn test_header_too_large_without_delimiter() {
        let limits = Limits {
            max_header_size: 64,
            ..Limits::default()
        };
        let mut decoder = RequestDecoder::new(limits);
        let mut buf = BytesMut::from(&b"GET / HTTP/1.1\r\n"[..]);
        assert!(decoder.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&[b'a'; 64]);
        match decoder.decode(&mut buf) {
            Err(ProtocolError::HeaderTooLarge(_)) => {}
            other => panic!("Expected HeaderTooLarge, got {:?}", other),
        }
    }

    #[test]
    fn test_body_too_large() {
        let limits = Limits {
            max_body_size: 8,
            ..Limits::default()
        };
        let mut decoder = RequestDecoder::new(limits);
        let mut buf = BytesMut::from(&b"POST /api/event HTTP/1.1\r\nContent-Length: 9\r\n\r\n"[..]);

        match decoder.decode(&mut buf) {
            Err(ProtocolError::BodyTooLarge(9)) => {}
            other => panic!("Expected BodyTooLarge, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_request_line() {
        let mut decoder = RequestDecoder::default();
        let mut buf = BytesMut::from(&b"NONSENSE\r\n\r\n"[..]);

        assert!(matches!(
            decoder.decode(&mut buf),
            Err(ProtocolError::MalformedRequestLine(_))
        ));
    }

    #[test]
    fn test_invalid_header_line() {
        let mut decoder = RequestDecoder::default();
        let mut buf = BytesMut::from(&b"GET / HTTP/1.1\r\nno-colon-here\r\n\r\n"[..]);

        assert!(matches!(
            decoder.decode(&mut buf),
            Err(ProtocolError::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_body_preview_truncates() {
        let request = Request {
            method: "POST".into(),
            target: "/".into(),
            version: "HTTP/1.1".into(),
            headers: Vec::new(),
            body: Bytes::from_static(b"0123456789"),
        };
        assert_eq!(request.body_preview(4), "0123");
        assert_eq!(request.body_preview(100), "0123456789");
    }

    #[test]
    fn test_response_encoding() {
        let response = Response::text(StatusCode::Ok, "running");
        let encoded = response.encode();

        assert_eq!(
            &encoded[..],
            b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 7\r\nConnection: close\r\n\r\nrunning"
        );
    }

    #[test]
    fn test_json_response() {
        let response = Response::json(StatusCode::BadRequest, &ErrorReply::new("bad")).unwrap();

        assert_eq!(response.status(), StatusCode::BadRequest);
        assert_eq!(response.content_type(), "application/json");
        let text = String::from_utf8(response.encode().to_vec()).unwrap();
        assert!(text.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(text.ends_with(r#"{"status":"error","message":"bad"}"#));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(u16::from(StatusCode::ServiceUnavailable), 503);
        assert_eq!(StatusCode::NotFound.to_string(), "404 Not Found");
        assert!(StatusCode::PayloadTooLarge.is_client_error());
        assert!(!StatusCode::InternalServerError.is_client_error());
    }
}

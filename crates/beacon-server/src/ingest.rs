//! Event ingestion endpoint.
//!
//! One request per connection: read until the decoder yields a request,
//! answer it, close. Accepted events go straight onto the shared queue.

use std::sync::Arc;
use std::time::Duration;

use beacon_core::{Event, EventQueue, QueueError};
use beacon_protocol::{
    codec, Ack, ErrorReply, Limits, ProtocolError, Request, RequestDecoder, Response, StatusCode,
};
use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::metrics;

/// Body of the `GET /` health reply.
pub const RUNNING_MESSAGE: &str = "Beacon event server is running";

/// Path events are submitted to.
pub const EVENT_PATH: &str = "/api/event";

const BODY_PREVIEW: usize = 300;

/// Per-connection settings.
#[derive(Debug, Clone, Copy)]
pub struct IngestSettings {
    pub limits: Limits,
    pub read_timeout: Duration,
}

#[derive(Debug, Error)]
enum ReadError {
    #[error("peer closed before sending a full request")]
    Closed,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Accept ingestion connections until shutdown is signalled.
pub async fn run_ingest_server(
    listener: TcpListener,
    queue: Arc<EventQueue>,
    settings: IngestSettings,
    mut shutdown: watch::Receiver<bool>,
) {
    if let Ok(addr) = listener.local_addr() {
        info!("Ingestion endpoint listening on http://{}", addr);
    }

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,

            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let queue = Arc::clone(&queue);
                    tokio::spawn(
                        handle_connection(stream, queue, settings)
                            .instrument(info_span!("ingest", peer = %peer)),
                    );
                }
                Err(e) => {
                    warn!(error = %e, "Failed to accept ingestion connection");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    info!("Ingestion endpoint stopped");
}

/// Serve a single exchange on `stream`.
pub async fn handle_connection(
    mut stream: TcpStream,
    queue: Arc<EventQueue>,
    settings: IngestSettings,
) {
    let mut decoder = RequestDecoder::new(settings.limits);
    let mut buf = BytesMut::with_capacity(4096);

    let read = tokio::time::timeout(
        settings.read_timeout,
        read_request(&mut stream, &mut decoder, &mut buf),
    )
    .await;

    let response = match read {
        Err(_) => {
            warn!(
                timeout_ms = settings.read_timeout.as_millis() as u64,
                "Timed out waiting for request"
            );
            return;
        }
        Ok(Err(ReadError::Closed)) => {
            debug!("Connection closed before a full request arrived");
            return;
        }
        Ok(Err(ReadError::Io(e))) => {
            warn!(error = %e, "Read failed");
            return;
        }
        Ok(Err(ReadError::Protocol(e))) => {
            warn!(error = %e, "Rejected malformed request");
            let status = e.status();
            metrics::record_rejected(status);
            Response::reason(status)
        }
        Ok(Ok(request)) => handle_request(&request, &queue),
    };

    if let Err(e) = write_response(&mut stream, &response).await {
        debug!(error = %e, "Failed to write response");
    }
}

async fn read_request(
    stream: &mut TcpStream,
    decoder: &mut RequestDecoder,
    buf: &mut BytesMut,
) -> Result<Request, ReadError> {
    loop {
        if let Some(request) = decoder.decode(buf)? {
            return Ok(request);
        }
        if stream.read_buf(buf).await? == 0 {
            return Err(ReadError::Closed);
        }
    }
}

async fn write_response(stream: &mut TcpStream, response: &Response) -> std::io::Result<()> {
    stream.write_all(&response.encode()).await?;
    stream.shutdown().await
}

/// Route a decoded request and produce its response.
pub fn handle_request(request: &Request, queue: &EventQueue) -> Response {
    info!(
        method = %request.method,
        path = %request.target,
        body = %request.body_preview(BODY_PREVIEW),
        "Ingestion request"
    );

    let response = match (request.method.as_str(), request.target.as_str()) {
        ("GET", "/") => Response::text(StatusCode::Ok, RUNNING_MESSAGE),
        ("POST", EVENT_PATH) => submit_event(&request.body, queue),
        _ => Response::reason(StatusCode::NotFound),
    };

    if response.status() != StatusCode::Ok {
        metrics::record_rejected(response.status());
    }
    response
}

fn submit_event(body: &[u8], queue: &EventQueue) -> Response {
    let submission = match codec::decode_submission(body) {
        Ok(submission) => submission,
        Err(e) => {
            warn!(error = %e, "Rejected event submission");
            return error_response(StatusCode::BadRequest, &e.to_string());
        }
    };

    let event = Event::new(submission.event_type, submission.data);
    let ack = Ack::accepted(event.event_type(), event.timestamp());
    let response = match Response::json(StatusCode::Ok, &ack) {
        Ok(response) => response,
        Err(e) => {
            error!(error = %e, "Failed to encode acknowledgement");
            return error_response(StatusCode::InternalServerError, "Internal server error");
        }
    };

    match queue.push(event) {
        Ok(depth) => {
            info!(event_type = %ack.event_type, depth, "Event queued for broadcast");
            metrics::record_ingested(depth);
            response
        }
        Err(QueueError::Full(pending)) => {
            warn!(event_type = %ack.event_type, pending, "Event queue is full");
            error_response(StatusCode::ServiceUnavailable, "Event queue is full")
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    Response::json(status, &ErrorReply::new(message)).unwrap_or_else(|e| {
        error!(error = %e, "Failed to encode error reply");
        Response::reason(StatusCode::InternalServerError)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use serde_json::{json, Value};

    fn request(method: &str, target: &str, body: &str) -> Request {
        Request {
            method: method.to_string(),
            target: target.to_string(),
            version: "HTTP/1.1".to_string(),
            headers: vec![("Content-Length".to_string(), body.len().to_string())],
            body: Bytes::from(body.to_string()),
        }
    }

    fn json_body(response: &Response) -> Value {
        serde_json::from_slice(response.body()).unwrap()
    }

    #[test]
    fn test_root_is_alive() {
        let queue = EventQueue::new();
        let response = handle_request(&request("GET", "/", ""), &queue);

        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(response.content_type(), "text/plain");
        assert_eq!(response.body().as_ref(), RUNNING_MESSAGE.as_bytes());
    }

    #[test]
    fn test_unknown_route() {
        let queue = EventQueue::new();
        for (method, target) in [("GET", "/api/event"), ("POST", "/"), ("DELETE", "/api/event")] {
            let response = handle_request(&request(method, target, ""), &queue);
            assert_eq!(response.status(), StatusCode::NotFound);
            assert_eq!(response.body().as_ref(), b"Not Found");
        }
    }

    #[test]
    fn test_event_accepted_and_queued() {
        let queue = EventQueue::new();
        let body = r#"{"type":"alert","data":{"x":1}}"#;
        let response = handle_request(&request("POST", EVENT_PATH, body), &queue);

        assert_eq!(response.status(), StatusCode::Ok);
        assert_eq!(response.content_type(), "application/json");

        let ack = json_body(&response);
        assert_eq!(ack["status"], "success");
        assert_eq!(ack["message"], "Event received and queued for broadcast");
        assert_eq!(ack["event_type"], "alert");

        let events = queue.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), "alert");
        assert_eq!(events[0].payload(), &json!({"x": 1}));
        assert_eq!(ack["timestamp"], events[0].timestamp());
    }

    #[test]
    fn test_missing_type_rejected() {
        let queue = EventQueue::new();
        let response = handle_request(&request("POST", EVENT_PATH, r#"{"data":{}}"#), &queue);

        assert_eq!(response.status(), StatusCode::BadRequest);
        assert_eq!(
            json_body(&response),
            json!({"status": "error", "message": "Missing 'type' or 'data' field"})
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn test_bad_bodies_never_reach_queue() {
        let queue = EventQueue::new();
        let cases = [
            ("", "Request body is empty"),
            (r#"{"type":"a"}"#, "Missing 'type' or 'data' field"),
            (r#"[1,2]"#, "Missing 'type' or 'data' field"),
            (r#"{"type":"","data":1}"#, "Field 'type' must be a non-empty string"),
            (r#"{"type":7,"data":1}"#, "Field 'type' must be a non-empty string"),
        ];

        for (body, message) in cases {
            let response = handle_request(&request("POST", EVENT_PATH, body), &queue);
            assert_eq!(response.status(), StatusCode::BadRequest, "body: {body}");
            assert_eq!(json_body(&response)["message"], message, "body: {body}");
        }

        let response = handle_request(&request("POST", EVENT_PATH, "{not json"), &queue);
        assert_eq!(response.status(), StatusCode::BadRequest);
        let message = json_body(&response)["message"].as_str().unwrap().to_string();
        assert!(message.starts_with("Invalid JSON format: "));

        assert!(queue.is_empty());
    }

    #[test]
    fn test_full_queue_rejected() {
        let queue = EventQueue::with_capacity(1);
        let body = r#"{"type":"t","data":null}"#;

        let first = handle_request(&request("POST", EVENT_PATH, body), &queue);
        assert_eq!(first.status(), StatusCode::Ok);

        let second = handle_request(&request("POST", EVENT_PATH, body), &queue);
        assert_eq!(second.status(), StatusCode::ServiceUnavailable);
        assert_eq!(json_body(&second)["message"], "Event queue is full");
        assert_eq!(queue.len(), 1);
    }

    mod connection {
        use super::*;
        use std::net::SocketAddr;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        async fn serve(queue: Arc<EventQueue>, read_timeout: Duration) -> SocketAddr {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let settings = IngestSettings {
                limits: Limits::default(),
                read_timeout,
            };
            tokio::spawn(async move {
                loop {
                    let (stream, _) = listener.accept().await.unwrap();
                    tokio::spawn(handle_connection(stream, Arc::clone(&queue), settings));
                }
            });
            addr
        }

        async fn exchange(addr: SocketAddr, parts: &[&[u8]]) -> String {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            for part in parts {
                stream.write_all(part).await.unwrap();
                stream.flush().await.unwrap();
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            let mut reply = String::new();
            stream.read_to_string(&mut reply).await.unwrap();
            reply
        }

        #[tokio::test]
        async fn test_split_request_over_socket() {
            let queue = Arc::new(EventQueue::new());
            let addr = serve(Arc::clone(&queue), Duration::from_secs(5)).await;

            let body = r#"{"type":"alert","data":{"x":1}}"#;
            let head = format!(
                "POST /api/event HTTP/1.1\r\nHost: localhost\r\ncontent-length: {}\r\n\r\n",
                body.len()
            );
            let (first, rest) = head.as_bytes().split_at(10);
            let reply = exchange(addr, &[first, rest, &body.as_bytes()[..5], &body.as_bytes()[5..]]).await;

            assert!(reply.starts_with("HTTP/1.1 200 OK\r\n"), "{reply}");
            assert!(reply.contains("Connection: close\r\n"));
            assert!(reply.contains("Event received and queued for broadcast"));
            assert_eq!(queue.len(), 1);
        }

        #[tokio::test]
        async fn test_malformed_request_line() {
            let queue = Arc::new(EventQueue::new());
            let addr = serve(Arc::clone(&queue), Duration::from_secs(5)).await;

            let reply = exchange(addr, &[b"NONSENSE\r\n\r\n".as_slice()]).await;
            assert!(reply.starts_with("HTTP/1.1 400 Bad Request\r\n"), "{reply}");
            assert!(reply.ends_with("Bad Request"));
        }

        #[tokio::test]
        async fn test_oversized_body() {
            let queue = Arc::new(EventQueue::new());
            let addr = serve(Arc::clone(&queue), Duration::from_secs(5)).await;

            let head = format!(
                "POST /api/event HTTP/1.1\r\nContent-Length: {}\r\n\r\n",
                Limits::default().max_body_size + 1
            );
            let reply = exchange(addr, &[head.as_bytes()]).await;
            assert!(reply.starts_with("HTTP/1.1 413 "), "{reply}");
            assert!(queue.is_empty());
        }

        #[tokio::test]
        async fn test_second_request_ignored() {
            let queue = Arc::new(EventQueue::new());
            let addr = serve(Arc::clone(&queue), Duration::from_secs(5)).await;

            let one = r#"{"type":"one","data":1}"#;
            let two = r#"{"type":"two","data":2}"#;
            let pipelined = format!(
                "POST /api/event HTTP/1.1\r\nContent-Length: {}\r\n\r\n{one}\
                 POST /api/event HTTP/1.1\r\nContent-Length: {}\r\n\r\n{two}",
                one.len(),
                two.len()
            );
            let reply = exchange(addr, &[pipelined.as_bytes()]).await;

            assert_eq!(reply.matches("HTTP/1.1").count(), 1);
            let events = queue.drain();
            assert_eq!(events.len(), 1);
            assert_eq!(events[0].event_type(), "one");
        }

        #[tokio::test]
        async fn test_idle_client_is_dropped() {
            let queue = Arc::new(EventQueue::new());
            let addr = serve(Arc::clone(&queue), Duration::from_millis(100)).await;

            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream.write_all(b"POST /api/event HTTP/1.1\r\n").await.unwrap();

            let mut reply = Vec::new();
            let read = tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut reply))
                .await
                .unwrap();
            assert!(read.is_ok());
            assert!(reply.is_empty());
        }
    }
}

//! HTTP transports.
//!
//! Two wire protocols are supported, each with a server handler built on
//! axum and a client built on reqwest:
//!
//! - **SSE** (protocol version 2024-11-05): a long-lived `GET` event stream
//!   for server messages and one `POST` per client message.
//!   See [`SseServer`] and [`SseClientTransport`].
//! - **Streamable HTTP**: a single endpoint where each `POST` may answer with
//!   an event stream, with session ids and resumable streams.
//!   See [`StreamableHttpServer`] and [`StreamableClientTransport`].
//!
//! Server handlers mint one transport per session and pass it to a connector
//! callback, which typically hands it to an MCP server.
//!
//! # Example
//!
//! ```rust
//! use mcpkit_transport::http::HttpClientConfig;
//! use std::time::Duration;
//!
//! let config = HttpClientConfig::new("http://localhost:8080/mcp")
//!     .with_connect_timeout(Duration::from_secs(30))
//!     .with_max_reconnect_attempts(3);
//!
//! assert_eq!(config.url, "http://localhost:8080/mcp");
//! ```

mod config;
mod sse;
mod sse_client;
mod sse_server;
mod streamable_client;
mod streamable_server;

use std::pin::Pin;
use std::sync::Arc;

use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::{Stream, StreamExt};
use mcpkit_core::protocol::Message;
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub use config::{
    DEFAULT_MAX_MESSAGE_SIZE, HttpClientConfig, HttpServerConfig, LAST_EVENT_ID_HEADER,
    MCP_SESSION_ID_HEADER,
};
pub use sse::{SseEvent, SseParser};
pub use sse_client::SseClientTransport;
pub use sse_server::{SESSION_ID_PARAM, SseServer, SseServerTransport};
pub use streamable_client::StreamableClientTransport;
pub use streamable_server::{STANDALONE_STREAM, StreamableHttpServer, StreamableServerTransport};

use crate::error::TransportError;
use crate::runtime::CancellationToken;

/// Receives each transport minted by a server handler.
pub(crate) type Connector<T> = Arc<dyn Fn(T) -> BoxFuture<'static, ()> + Send + Sync>;

/// Messages, or the error that ended a stream, on their way to `recv`.
pub(crate) type Incoming = mpsc::UnboundedSender<Result<Message, TransportError>>;

pub(crate) type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

/// Reject requests whose `Origin` is not allowed (DNS rebinding protection).
///
/// Requests without an `Origin` header come from non-browser clients and
/// are allowed.
pub(crate) fn validate_origin(
    headers: &HeaderMap,
    config: &HttpServerConfig,
) -> Result<(), Response> {
    if config.allowed_origins.is_empty() {
        return Ok(());
    }
    match headers.get(header::ORIGIN).and_then(|v| v.to_str().ok()) {
        Some(origin) if !config.is_origin_allowed(origin) => {
            warn!(origin = %origin, "Rejecting request from disallowed origin");
            Err((StatusCode::FORBIDDEN, "Origin not allowed").into_response())
        }
        _ => Ok(()),
    }
}

/// Whether the `Accept` header lists `media_type` (or a matching wildcard).
pub(crate) fn accepts(headers: &HeaderMap, media_type: &str) -> bool {
    let (kind, _) = media_type.split_once('/').unwrap_or((media_type, ""));
    headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|item| item.split(';').next().unwrap_or("").trim())
        .any(|item| item == media_type || item == "*/*" || item == format!("{kind}/*"))
}

pub(crate) fn build_client(config: &HttpClientConfig) -> Result<reqwest::Client, TransportError> {
    reqwest::Client::builder()
        .connect_timeout(config.connect_timeout)
        .build()
        .map_err(|e| TransportError::connection(format!("Failed to build HTTP client: {e}")))
}

pub(crate) fn with_headers(
    mut request: reqwest::RequestBuilder,
    config: &HttpClientConfig,
) -> reqwest::RequestBuilder {
    for (name, value) in &config.headers {
        request = request.header(name.as_str(), value.as_str());
    }
    request
}

/// Turn a non-success response into an error carrying its body.
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| status.canonical_reason().unwrap_or("").to_string());
    Err(TransportError::HttpStatus {
        status: status.as_u16(),
        message,
    })
}

/// Forward one event to `incoming` if it carries a message.
///
/// Returns `false` once nobody is listening any more.
pub(crate) fn deliver(event: &SseEvent, incoming: &Incoming) -> bool {
    if event.name() != "message" {
        debug!(event = event.name(), "ignoring SSE event");
        return true;
    }
    let msg = serde_json::from_str::<Message>(&event.data).map_err(TransportError::from);
    incoming.send(msg).is_ok()
}

/// Read message events from `body` until it ends, recording the id of the
/// last event seen.
///
/// Returns `Ok(())` when the body ends cleanly, when the transport closes,
/// or when nobody is listening.
pub(crate) async fn pump_events(
    mut body: ByteStream,
    parser: &mut SseParser,
    last_event_id: &mut Option<String>,
    incoming: &Incoming,
    closed: &CancellationToken,
) -> Result<(), TransportError> {
    loop {
        let chunk = tokio::select! {
            chunk = body.next() => chunk,
            () = closed.cancelled() => return Ok(()),
        };
        let Some(chunk) = chunk else {
            return Ok(());
        };
        for event in parser.push(&chunk?)? {
            if event.id.is_some() {
                last_event_id.clone_from(&event.id);
            }
            if !deliver(&event, incoming) {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(accept: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static(accept));
        headers
    }

    #[test]
    fn test_accepts() {
        let both = headers("application/json, text/event-stream");
        assert!(accepts(&both, "application/json"));
        assert!(accepts(&both, "text/event-stream"));

        let json = headers("application/json;q=0.9");
        assert!(accepts(&json, "application/json"));
        assert!(!accepts(&json, "text/event-stream"));

        assert!(accepts(&headers("*/*"), "text/event-stream"));
        assert!(accepts(&headers("text/*"), "text/event-stream"));
        assert!(!accepts(&HeaderMap::new(), "text/event-stream"));
    }

    #[test]
    fn test_validate_origin() {
        let config = HttpServerConfig::default().with_allowed_origin("https://ok.example");
        let mut headers = HeaderMap::new();
        assert!(validate_origin(&headers, &config).is_ok());

        headers.insert(header::ORIGIN, HeaderValue::from_static("https://ok.example"));
        assert!(validate_origin(&headers, &config).is_ok());

        headers.insert(header::ORIGIN, HeaderValue::from_static("https://evil.example"));
        let rejected = validate_origin(&headers, &config).unwrap_err();
        assert_eq!(rejected.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_deliver_skips_other_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let endpoint = SseEvent {
            event: Some("endpoint".to_string()),
            data: "/sse?sessionid=1".to_string(),
            id: None,
        };
        assert!(deliver(&endpoint, &tx));
        assert!(rx.try_recv().is_err());

        let message = SseEvent {
            event: None,
            data: r#"{"jsonrpc":"2.0","method":"ping","id":1}"#.to_string(),
            id: None,
        };
        assert!(deliver(&message, &tx));
        assert!(matches!(rx.try_recv(), Ok(Ok(Message::Request(_)))));

        let garbage = SseEvent {
            event: None,
            data: "nope".to_string(),
            id: None,
        };
        assert!(deliver(&garbage, &tx));
        assert!(matches!(rx.try_recv(), Ok(Err(TransportError::Json(_)))));
    }
}

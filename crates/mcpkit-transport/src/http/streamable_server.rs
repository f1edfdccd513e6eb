//! Server side of the streamable HTTP transport.
//!
//! One endpoint serves the whole session:
//!
//! - `POST` carries one message or a batch. The first POST of a session may
//!   omit `Mcp-Session-Id`; the handler then creates a session and hands its
//!   transport to the connector. A POST with no requests gets `202`. A POST
//!   with requests gets an SSE stream carrying their responses plus any
//!   traffic sent while handling them, and the stream ends once every
//!   response has been delivered.
//! - `GET` opens the standalone stream for server-initiated traffic, or
//!   resumes an earlier stream when `Last-Event-ID` names one.
//! - `DELETE` terminates the session.
//!
//! Every event id has the form `<stream>_<index>`. Stream `0` is the
//! standalone stream; POST streams are numbered from `1`. Outgoing messages
//! are logged per stream so that a reader can resume after a disconnect.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, Method, StatusCode, header};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use mcpkit_core::id::random_session_id;
use mcpkit_core::protocol::{Message, RequestId};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::config::{HttpServerConfig, LAST_EVENT_ID_HEADER, MCP_SESSION_ID_HEADER};
use super::{Connector, accepts, validate_origin};
use crate::error::TransportError;
use crate::runtime::{AsyncMutex, CancellationToken, Notify, lock};
use crate::traits::{Transport, TransportMetadata, related_request};

/// Id of the standalone stream opened by `GET`.
pub const STANDALONE_STREAM: u64 = 0;

/// An axum handler serving streamable HTTP sessions.
#[derive(Clone)]
pub struct StreamableHttpServer {
    shared: Arc<Shared>,
}

struct Shared {
    config: HttpServerConfig,
    sessions: std::sync::Mutex<HashMap<String, Arc<SessionState>>>,
    connector: Connector<StreamableServerTransport>,
}

impl StreamableHttpServer {
    /// Create a handler that passes each new session's transport to
    /// `connector`. The connector's future is spawned.
    pub fn new<F, Fut>(config: HttpServerConfig, connector: F) -> Self
    where
        F: Fn(StreamableServerTransport) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            shared: Arc::new(Shared {
                config,
                sessions: std::sync::Mutex::new(HashMap::new()),
                connector: Arc::new(move |transport| Box::pin(connector(transport))),
            }),
        }
    }

    /// Build an axum router serving the configured endpoint.
    pub fn router(&self) -> Router {
        Router::new()
            .route(&self.shared.config.endpoint, any(handle))
            .layer(DefaultBodyLimit::max(self.shared.config.max_message_size))
            .with_state(Arc::clone(&self.shared))
    }

    /// Ids of the currently open sessions.
    #[must_use]
    pub fn session_ids(&self) -> Vec<String> {
        lock(&self.shared.sessions).keys().cloned().collect()
    }
}

#[derive(Default)]
struct Streams {
    next_stream_id: u64,
    logs: HashMap<u64, Vec<Message>>,
    request_streams: HashMap<RequestId, u64>,
    outstanding: HashMap<u64, HashSet<RequestId>>,
    readers: HashSet<u64>,
}

enum Next {
    Event(Message),
    Wait,
    Done,
}

struct SessionState {
    id: String,
    incoming: mpsc::UnboundedSender<Message>,
    streams: std::sync::Mutex<Streams>,
    changed: Notify,
    closed: CancellationToken,
}

impl SessionState {
    /// Log an outgoing message on the stream it belongs to.
    ///
    /// A response goes to the stream of its request. Anything else goes to
    /// the stream of the request currently being handled, if any, and
    /// otherwise to the standalone stream.
    fn route(&self, msg: Message) {
        {
            let mut streams = lock(&self.streams);
            let stream_id = match &msg {
                Message::Response(response) => {
                    match streams.request_streams.remove(&response.id) {
                        Some(stream_id) => {
                            if let Some(ids) = streams.outstanding.get_mut(&stream_id) {
                                ids.remove(&response.id);
                            }
                            stream_id
                        }
                        None => STANDALONE_STREAM,
                    }
                }
                _ => related_request()
                    .and_then(|id| streams.request_streams.get(&id).copied())
                    .unwrap_or(STANDALONE_STREAM),
            };
            streams.logs.entry(stream_id).or_default().push(msg);
        }
        self.changed.notify(usize::MAX);
    }

    /// Register a stream for the requests of one POST and claim its reader.
    fn open_post_stream(&self, ids: HashSet<RequestId>) -> u64 {
        let mut streams = lock(&self.streams);
        streams.next_stream_id += 1;
        let stream_id = streams.next_stream_id;
        for id in &ids {
            streams.request_streams.insert(id.clone(), stream_id);
        }
        streams.outstanding.insert(stream_id, ids);
        streams.logs.insert(stream_id, Vec::new());
        streams.readers.insert(stream_id);
        stream_id
    }

    fn is_pending(&self, id: &RequestId) -> bool {
        lock(&self.streams).request_streams.contains_key(id)
    }

    fn claim_reader(&self, stream_id: u64) -> Result<(), &'static str> {
        let mut streams = lock(&self.streams);
        if stream_id != STANDALONE_STREAM && !streams.logs.contains_key(&stream_id) {
            return Err("unknown stream");
        }
        if !streams.readers.insert(stream_id) {
            return Err("stream already has a reader");
        }
        Ok(())
    }

    fn next(&self, stream_id: u64, index: usize) -> Next {
        let streams = lock(&self.streams);
        if let Some(msg) = streams.logs.get(&stream_id).and_then(|log| log.get(index)) {
            return Next::Event(msg.clone());
        }
        let finished = stream_id != STANDALONE_STREAM
            && streams
                .outstanding
                .get(&stream_id)
                .is_none_or(HashSet::is_empty);
        if finished { Next::Done } else { Next::Wait }
    }
}

/// Reads one stream's log; releases the reader slot when dropped.
struct Cursor {
    session: Arc<SessionState>,
    stream_id: u64,
    index: usize,
}

impl Drop for Cursor {
    fn drop(&mut self) {
        lock(&self.session.streams).readers.remove(&self.stream_id);
    }
}

fn event_stream(cursor: Cursor) -> Response {
    let session_id = cursor.session.id.clone();
    let events = futures::stream::unfold(cursor, |mut cursor| async move {
        loop {
            let listener = cursor.session.changed.listen();
            match cursor.session.next(cursor.stream_id, cursor.index) {
                Next::Event(msg) => {
                    let event = Event::default()
                        .event("message")
                        .id(format!("{}_{}", cursor.stream_id, cursor.index))
                        .json_data(&msg);
                    cursor.index += 1;
                    return Some((event, cursor));
                }
                Next::Done => return None,
                Next::Wait => {}
            }
            tokio::select! {
                () = listener => {}
                () = cursor.session.closed.cancelled() => return None,
            }
        }
    });
    with_session(
        &session_id,
        Sse::new(events).keep_alive(KeepAlive::default()),
    )
}

fn with_session(session_id: &str, response: impl IntoResponse) -> Response {
    ([(MCP_SESSION_ID_HEADER, session_id.to_string())], response).into_response()
}

fn parse_event_id(value: &str) -> Option<(u64, usize)> {
    let (stream, index) = value.split_once('_')?;
    Some((stream.parse().ok()?, index.parse().ok()?))
}

fn parse_body(body: &[u8]) -> Result<Vec<Message>, serde_json::Error> {
    let is_batch = body
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|b| *b == b'[');
    if is_batch {
        serde_json::from_slice(body)
    } else {
        serde_json::from_slice(body).map(|msg| vec![msg])
    }
}

/// The server end of one streamable HTTP session.
pub struct StreamableServerTransport {
    session: Arc<SessionState>,
    incoming: AsyncMutex<mpsc::UnboundedReceiver<Message>>,
    metadata: TransportMetadata,
}

impl StreamableServerTransport {
    /// The session id sent in `Mcp-Session-Id`.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session.id
    }
}

impl Transport for StreamableServerTransport {
    type Error = TransportError;

    async fn send(&self, msg: Message) -> Result<(), Self::Error> {
        if self.session.closed.is_cancelled() {
            return Err(TransportError::ConnectionClosed);
        }
        self.session.route(msg);
        Ok(())
    }

    async fn recv(&self) -> Result<Option<Message>, Self::Error> {
        let mut incoming = self.incoming.lock().await;
        tokio::select! {
            msg = incoming.recv() => Ok(msg),
            () = self.session.closed.cancelled() => Ok(None),
        }
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.session.closed.cancel();
        self.session.changed.notify(usize::MAX);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.session.closed.is_cancelled()
    }

    fn metadata(&self) -> TransportMetadata {
        self.metadata.clone()
    }
}

async fn handle(
    State(shared): State<Arc<Shared>>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(response) = validate_origin(&headers, &shared.config) {
        return response;
    }
    match method {
        Method::POST => handle_post(&shared, &headers, &body),
        Method::GET => handle_get(&shared, &headers),
        Method::DELETE => handle_delete(&shared, &headers),
        _ => reply(
            &shared,
            &headers,
            (
                StatusCode::METHOD_NOT_ALLOWED,
                [(header::ALLOW, "GET, POST, DELETE")],
                "method not allowed",
            ),
        ),
    }
}

fn session_header(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(MCP_SESSION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
}

fn find_session(shared: &Shared, id: &str) -> Option<Arc<SessionState>> {
    lock(&shared.sessions).get(id).cloned()
}

/// A response that carries `Mcp-Session-Id` when the request named a live
/// session.
fn reply(shared: &Shared, headers: &HeaderMap, response: impl IntoResponse) -> Response {
    match session_header(headers).and_then(|id| find_session(shared, id)) {
        Some(session) => with_session(&session.id, response),
        None => response.into_response(),
    }
}

fn create_session(shared: &Arc<Shared>) -> Arc<SessionState> {
    let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
    let session = Arc::new(SessionState {
        id: random_session_id(),
        incoming: incoming_tx,
        streams: std::sync::Mutex::new(Streams::default()),
        changed: Notify::new(),
        closed: CancellationToken::new(),
    });
    lock(&shared.sessions).insert(session.id.clone(), Arc::clone(&session));

    {
        let shared = Arc::clone(shared);
        let session = Arc::clone(&session);
        tokio::spawn(async move {
            session.closed.cancelled().await;
            lock(&shared.sessions).remove(&session.id);
            session.changed.notify(usize::MAX);
            info!(session_id = %session.id, "streamable session closed");
        });
    }

    let transport = StreamableServerTransport {
        session: Arc::clone(&session),
        incoming: AsyncMutex::new(incoming_rx),
        metadata: TransportMetadata::new("streamable-http")
            .session_id(session.id.clone())
            .connected_now(),
    };
    tokio::spawn((shared.connector)(transport));
    info!(session_id = %session.id, "streamable session opened");
    session
}

fn handle_post(shared: &Arc<Shared>, headers: &HeaderMap, body: &[u8]) -> Response {
    if !accepts(headers, "application/json") || !accepts(headers, "text/event-stream") {
        return reply(
            shared,
            headers,
            (
                StatusCode::BAD_REQUEST,
                "Accept must contain both application/json and text/event-stream",
            ),
        );
    }

    // The body is validated before a session is looked up or created, so a
    // rejected POST never opens a session.
    let messages = match parse_body(body) {
        Ok(messages) if !messages.is_empty() => messages,
        Ok(_) => return reply(shared, headers, (StatusCode::BAD_REQUEST, "empty batch")),
        Err(e) => {
            warn!(error = %e, "failed to parse POST body");
            return reply(
                shared,
                headers,
                (StatusCode::BAD_REQUEST, format!("failed to parse body: {e}")),
            );
        }
    };
    let mut ids = HashSet::new();
    for msg in &messages {
        if let Message::Request(request) = msg {
            if !ids.insert(request.id.clone()) {
                return reply(
                    shared,
                    headers,
                    (
                        StatusCode::BAD_REQUEST,
                        format!("duplicate request id {}", request.id),
                    ),
                );
            }
        }
    }

    let session = match session_header(headers) {
        Some(id) => match find_session(shared, id) {
            Some(session) => session,
            None => {
                debug!(session_id = %id, "POST for unknown session");
                return (StatusCode::NOT_FOUND, "session not found").into_response();
            }
        },
        None => create_session(shared),
    };
    if let Some(id) = ids.iter().find(|id| session.is_pending(id)) {
        return with_session(
            &session.id,
            (StatusCode::BAD_REQUEST, format!("duplicate request id {id}")),
        );
    }

    if ids.is_empty() {
        for msg in messages {
            if session.incoming.send(msg).is_err() {
                return with_session(&session.id, (StatusCode::NOT_FOUND, "session closed"));
            }
        }
        return with_session(&session.id, StatusCode::ACCEPTED);
    }

    // The stream is registered before the requests are queued so that every
    // response finds it.
    let stream_id = session.open_post_stream(ids);
    let cursor = Cursor {
        session: Arc::clone(&session),
        stream_id,
        index: 0,
    };
    for msg in messages {
        if session.incoming.send(msg).is_err() {
            return with_session(&session.id, (StatusCode::NOT_FOUND, "session closed"));
        }
    }
    debug!(session_id = %session.id, stream_id, "opened POST stream");
    event_stream(cursor)
}

fn handle_get(shared: &Arc<Shared>, headers: &HeaderMap) -> Response {
    if !accepts(headers, "text/event-stream") {
        return reply(
            shared,
            headers,
            (StatusCode::BAD_REQUEST, "Accept must contain text/event-stream"),
        );
    }
    let Some(id) = session_header(headers) else {
        return (StatusCode::BAD_REQUEST, "missing session id").into_response();
    };
    let Some(session) = find_session(shared, id) else {
        return (StatusCode::NOT_FOUND, "session not found").into_response();
    };

    let (stream_id, index) = match headers.get(LAST_EVENT_ID_HEADER) {
        None => (STANDALONE_STREAM, 0),
        Some(value) => match value.to_str().ok().and_then(parse_event_id) {
            Some((stream_id, last)) => (stream_id, last + 1),
            None => {
                return with_session(
                    &session.id,
                    (StatusCode::BAD_REQUEST, "malformed Last-Event-ID"),
                );
            }
        },
    };

    if let Err(reason) = session.claim_reader(stream_id) {
        return with_session(&session.id, (StatusCode::BAD_REQUEST, reason));
    }
    debug!(session_id = %session.id, stream_id, index, "opened GET stream");
    event_stream(Cursor {
        session,
        stream_id,
        index,
    })
}

fn handle_delete(shared: &Arc<Shared>, headers: &HeaderMap) -> Response {
    let Some(id) = session_header(headers) else {
        return (StatusCode::BAD_REQUEST, "missing session id").into_response();
    };
    let Some(session) = lock(&shared.sessions).remove(id) else {
        return (StatusCode::NOT_FOUND, "session not found").into_response();
    };
    session.closed.cancel();
    info!(session_id = %session.id, "session terminated by client");
    with_session(&session.id, StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_event_id() {
        assert_eq!(parse_event_id("3_14"), Some((3, 14)));
        assert_eq!(parse_event_id("0_0"), Some((0, 0)));
        assert_eq!(parse_event_id("3-14"), None);
        assert_eq!(parse_event_id("x_1"), None);
        assert_eq!(parse_event_id("1_"), None);
    }

    #[test]
    fn test_parse_body_single_and_batch() {
        let single = parse_body(br#"{"jsonrpc":"2.0","method":"ping","id":1}"#).unwrap();
        assert_eq!(single.len(), 1);

        let batch = parse_body(
            br#" [{"jsonrpc":"2.0","method":"ping","id":1},
                 {"jsonrpc":"2.0","method":"notifications/initialized"}]"#,
        )
        .unwrap();
        assert_eq!(batch.len(), 2);

        assert!(parse_body(b"not json").is_err());
    }

    fn session() -> SessionState {
        let (incoming, _) = mpsc::unbounded_channel();
        SessionState {
            id: "s".to_string(),
            incoming,
            streams: std::sync::Mutex::new(Streams::default()),
            changed: Notify::new(),
            closed: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn test_routing_follows_related_request() {
        use crate::traits::with_related_request;
        use mcpkit_core::protocol::{Notification, Response as RpcResponse};

        let session = session();
        let stream_id = session.open_post_stream(HashSet::from([RequestId::from(1)]));
        assert_eq!(stream_id, 1);

        with_related_request(RequestId::from(1), async {
            session.route(Notification::new("notifications/progress").into());
        })
        .await;
        session.route(Notification::new("notifications/message").into());

        assert!(matches!(session.next(1, 0), Next::Event(_)));
        assert!(matches!(session.next(1, 1), Next::Wait));
        assert!(matches!(session.next(STANDALONE_STREAM, 0), Next::Event(_)));

        session.route(RpcResponse::success(1, serde_json::json!({})).into());
        assert!(matches!(session.next(1, 1), Next::Event(_)));
        assert!(matches!(session.next(1, 2), Next::Done));
        assert!(matches!(session.next(STANDALONE_STREAM, 1), Next::Wait));
    }

    #[test]
    fn test_claim_reader() {
        let session = session();
        assert_eq!(session.claim_reader(7), Err("unknown stream"));
        assert_eq!(session.claim_reader(STANDALONE_STREAM), Ok(()));
        assert_eq!(
            session.claim_reader(STANDALONE_STREAM),
            Err("stream already has a reader")
        );

        let stream_id = session.open_post_stream(HashSet::from([RequestId::from(1)]));
        assert_eq!(
            session.claim_reader(stream_id),
            Err("stream already has a reader")
        );
    }
}

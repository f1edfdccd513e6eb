//! Server side of the SSE transport (protocol version 2024-11-05).
//!
//! A client opens a session with `GET` and `Accept: text/event-stream`. The
//! handler mints a session id, answers with an `endpoint` event naming the
//! URL to POST to, and streams every server message as a `message` event.
//! Client messages arrive as single-message POSTs to that URL:
//!
//! - `202 Accepted` once the message is queued
//! - `400 Bad Request` if the body does not parse or the session id is missing
//! - `404 Not Found` if the session id is unknown
//!
//! Dropping the GET response ends the session.
//!
//! # Example
//!
//! ```no_run
//! use mcpkit_transport::http::{HttpServerConfig, SseServer};
//!
//! # async fn example() -> std::io::Result<()> {
//! let server = SseServer::new(HttpServerConfig::new("/sse"), |transport| async move {
//!     // hand `transport` to an MCP server session
//!     drop(transport);
//! });
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
//! axum::serve(listener, server.router()).await
//! # }
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use futures::StreamExt;
use mcpkit_core::id::random_session_id;
use mcpkit_core::protocol::Message;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::config::HttpServerConfig;
use super::{Connector, accepts, validate_origin};
use crate::error::TransportError;
use crate::runtime::{AsyncMutex, CancellationToken, lock};
use crate::traits::{Transport, TransportMetadata};

/// Query parameter carrying the session id on POSTs.
pub const SESSION_ID_PARAM: &str = "sessionid";

/// An axum handler serving SSE sessions.
#[derive(Clone)]
pub struct SseServer {
    shared: Arc<Shared>,
}

struct Shared {
    config: HttpServerConfig,
    sessions: std::sync::Mutex<HashMap<String, SessionHandle>>,
    connector: Connector<SseServerTransport>,
}

#[derive(Clone)]
struct SessionHandle {
    incoming: mpsc::UnboundedSender<Message>,
    closed: CancellationToken,
}

impl SseServer {
    /// Create a handler that passes each new session's transport to
    /// `connector`. The connector's future is spawned.
    pub fn new<F, Fut>(config: HttpServerConfig, connector: F) -> Self
    where
        F: Fn(SseServerTransport) -> Fut + Send + Sync + 'static,
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

    /// Build an axum router serving GET and POST at the configured endpoint.
    pub fn router(&self) -> Router {
        Router::new()
            .route(
                &self.shared.config.endpoint,
                get(handle_get).post(handle_post),
            )
            .layer(DefaultBodyLimit::max(self.shared.config.max_message_size))
            .with_state(Arc::clone(&self.shared))
    }

    /// Ids of the currently open sessions.
    #[must_use]
    pub fn session_ids(&self) -> Vec<String> {
        lock(&self.shared.sessions).keys().cloned().collect()
    }
}

/// The server end of one SSE session.
pub struct SseServerTransport {
    session_id: String,
    incoming: AsyncMutex<mpsc::UnboundedReceiver<Message>>,
    outgoing: mpsc::UnboundedSender<Message>,
    closed: CancellationToken,
    metadata: TransportMetadata,
}

impl SseServerTransport {
    /// The session id announced in the endpoint event.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl Transport for SseServerTransport {
    type Error = TransportError;

    async fn send(&self, msg: Message) -> Result<(), Self::Error> {
        if self.closed.is_cancelled() {
            return Err(TransportError::ConnectionClosed);
        }
        self.outgoing
            .send(msg)
            .map_err(|_| TransportError::ConnectionClosed)
    }

    async fn recv(&self) -> Result<Option<Message>, Self::Error> {
        let mut incoming = self.incoming.lock().await;
        tokio::select! {
            msg = incoming.recv() => Ok(msg),
            () = self.closed.cancelled() => Ok(None),
        }
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.closed.cancel();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.closed.is_cancelled()
    }

    fn metadata(&self) -> TransportMetadata {
        self.metadata.clone()
    }
}

async fn handle_get(State(shared): State<Arc<Shared>>, headers: HeaderMap) -> Response {
    if let Err(response) = validate_origin(&headers, &shared.config) {
        return response;
    }
    if !accepts(&headers, "text/event-stream") {
        return (
            StatusCode::BAD_REQUEST,
            "Accept must contain text/event-stream",
        )
            .into_response();
    }

    let session_id = random_session_id();
    let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
    let (outgoing_tx, mut outgoing_rx) = mpsc::unbounded_channel::<Message>();
    let closed = CancellationToken::new();

    lock(&shared.sessions).insert(
        session_id.clone(),
        SessionHandle {
            incoming: incoming_tx,
            closed: closed.clone(),
        },
    );
    {
        let shared = Arc::clone(&shared);
        let session_id = session_id.clone();
        let closed = closed.clone();
        tokio::spawn(async move {
            closed.cancelled().await;
            lock(&shared.sessions).remove(&session_id);
            info!(session_id = %session_id, "SSE session closed");
        });
    }

    let transport = SseServerTransport {
        session_id: session_id.clone(),
        incoming: AsyncMutex::new(incoming_rx),
        outgoing: outgoing_tx,
        closed: closed.clone(),
        metadata: TransportMetadata::new("sse")
            .session_id(session_id.clone())
            .connected_now(),
    };
    tokio::spawn((shared.connector)(transport));
    info!(session_id = %session_id, "SSE session opened");

    let endpoint = Event::default().event("endpoint").data(format!(
        "{}?{SESSION_ID_PARAM}={session_id}",
        shared.config.endpoint
    ));

    // The guard lives as long as the response body; a client disconnect
    // drops it and closes the session.
    let guard = closed.clone().drop_guard();
    let messages = futures::stream::unfold(
        (outgoing_rx, closed, guard),
        |(mut rx, closed, guard)| async move {
            let msg = tokio::select! {
                msg = rx.recv() => msg?,
                () = closed.cancelled() => return None,
            };
            let event = Event::default().event("message").json_data(&msg);
            Some((event, (rx, closed, guard)))
        },
    );
    let stream =
        futures::stream::once(async move { Ok::<_, axum::Error>(endpoint) }).chain(messages);

    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

async fn handle_post(
    State(shared): State<Arc<Shared>>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(response) = validate_origin(&headers, &shared.config) {
        return response;
    }
    let Some(session_id) = query.get(SESSION_ID_PARAM) else {
        return (StatusCode::BAD_REQUEST, "sessionid must be provided").into_response();
    };
    let Some(session) = lock(&shared.sessions).get(session_id).cloned() else {
        debug!(session_id = %session_id, "POST for unknown SSE session");
        return (StatusCode::NOT_FOUND, "session not found").into_response();
    };

    let msg: Message = match serde_json::from_slice(&body) {
        Ok(msg) => msg,
        Err(e) => {
            warn!(session_id = %session_id, error = %e, "failed to parse SSE POST body");
            return (StatusCode::BAD_REQUEST, format!("failed to parse body: {e}"))
                .into_response();
        }
    };

    if session.closed.is_cancelled() || session.incoming.send(msg).is_err() {
        return (StatusCode::NOT_FOUND, "session closed").into_response();
    }
    StatusCode::ACCEPTED.into_response()
}

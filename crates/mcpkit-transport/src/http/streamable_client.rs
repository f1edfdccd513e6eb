//! Client side of the streamable HTTP transport.
//!
//! Every outgoing message is POSTed. The server either accepts it with
//! `202`, answers with JSON, or answers with an event stream; streams are
//! read in the background and resumed with `Last-Event-ID` if they break.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use mcpkit_core::protocol::Message;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::Url;

use super::config::{HttpClientConfig, LAST_EVENT_ID_HEADER, MCP_SESSION_ID_HEADER};
use super::sse::SseParser;
use super::{ByteStream, Incoming, build_client, check_status, pump_events, with_headers};
use crate::error::TransportError;
use crate::runtime::{AsyncMutex, CancellationToken, lock};
use crate::traits::{Transport, TransportMetadata};

/// A client for a streamable HTTP server.
pub struct StreamableClientTransport {
    inner: Arc<Inner>,
    incoming: AsyncMutex<mpsc::UnboundedReceiver<Result<Message, TransportError>>>,
    metadata: TransportMetadata,
}

struct Inner {
    client: reqwest::Client,
    config: HttpClientConfig,
    url: Url,
    session_id: Mutex<Option<String>>,
    standalone_started: AtomicBool,
    incoming: Incoming,
    closed: CancellationToken,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum StreamKind {
    Post,
    Standalone,
}

impl StreamableClientTransport {
    /// Create a client for the endpoint at `config.url`.
    ///
    /// No request is made until the first message is sent.
    pub fn new(config: HttpClientConfig) -> Result<Self, TransportError> {
        let client = build_client(&config)?;
        let url = Url::parse(&config.url)
            .map_err(|e| TransportError::connection(format!("Invalid URL {}: {e}", config.url)))?;
        let (tx, rx) = mpsc::unbounded_channel();
        let metadata = TransportMetadata::new("streamable-http")
            .remote_addr(config.url.clone())
            .connected_now();

        Ok(Self {
            inner: Arc::new(Inner {
                client,
                config,
                url,
                session_id: Mutex::new(None),
                standalone_started: AtomicBool::new(false),
                incoming: tx,
                closed: CancellationToken::new(),
            }),
            incoming: AsyncMutex::new(rx),
            metadata,
        })
    }

    /// The session id assigned by the server, once known.
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        lock(&self.inner.session_id).clone()
    }
}

impl Inner {
    fn request(&self, method: reqwest::Method) -> reqwest::RequestBuilder {
        let mut request = with_headers(self.client.request(method, self.url.clone()), &self.config);
        if let Some(session_id) = lock(&self.session_id).as_deref() {
            request = request.header(MCP_SESSION_ID_HEADER, session_id);
        }
        request
    }

    fn remember_session(self: &Arc<Self>, response: &reqwest::Response) {
        let Some(session_id) = response
            .headers()
            .get(MCP_SESSION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
        else {
            return;
        };
        let is_new = {
            let mut current = lock(&self.session_id);
            let is_new = current.as_deref() != Some(session_id);
            *current = Some(session_id.to_string());
            is_new
        };
        if is_new {
            info!(session_id = %session_id, "streamable session established");
        }
        if self.config.standalone_stream && !self.standalone_started.swap(true, Ordering::SeqCst) {
            let inner = Arc::clone(self);
            tokio::spawn(async move {
                match inner.open_stream(None).await {
                    Ok(body) => inner.read_stream(body, StreamKind::Standalone).await,
                    Err(e) => warn!(error = %e, "failed to open standalone stream"),
                }
            });
        }
    }

    /// Issue a GET for an event stream, resuming after `last_event_id`.
    async fn open_stream(&self, last_event_id: Option<&str>) -> Result<ByteStream, TransportError> {
        let mut request = self
            .request(reqwest::Method::GET)
            .header(ACCEPT, "text/event-stream");
        if let Some(id) = last_event_id {
            request = request.header(LAST_EVENT_ID_HEADER, id);
        }
        let response = check_status(request.send().await?).await?;
        Ok(Box::pin(response.bytes_stream()))
    }

    async fn read_stream(self: Arc<Self>, mut body: ByteStream, kind: StreamKind) {
        let mut last_event_id: Option<String> = None;
        let mut attempts = 0;
        loop {
            let mut parser = SseParser::new(self.config.max_message_size);
            let result = pump_events(
                body,
                &mut parser,
                &mut last_event_id,
                &self.incoming,
                &self.closed,
            )
            .await;
            let err = match result {
                Ok(()) => {
                    debug!("event stream ended");
                    return;
                }
                Err(e) if self.closed.is_cancelled() => {
                    debug!(error = %e, "event stream failed after close");
                    return;
                }
                Err(e) => e,
            };

            let resumable = last_event_id.is_some() || kind == StreamKind::Standalone;
            if !resumable || attempts >= self.config.max_reconnect_attempts {
                warn!(error = %err, attempts, "event stream lost");
                let _ = self.incoming.send(Err(err));
                return;
            }
            attempts += 1;
            debug!(error = %err, attempts, last_event_id = ?last_event_id, "resuming event stream");
            body = match self.open_stream(last_event_id.as_deref()).await {
                Ok(body) => body,
                Err(e) => {
                    warn!(error = %e, "failed to resume event stream");
                    let _ = self.incoming.send(Err(e));
                    return;
                }
            };
        }
    }
}

fn is_event_stream(response: &reqwest::Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/event-stream"))
}

impl Transport for StreamableClientTransport {
    type Error = TransportError;

    async fn send(&self, msg: Message) -> Result<(), Self::Error> {
        if self.inner.closed.is_cancelled() {
            return Err(TransportError::ConnectionClosed);
        }
        let body = serde_json::to_vec(&msg)?;
        let response = self
            .inner
            .request(reqwest::Method::POST)
            .header(ACCEPT, "application/json, text/event-stream")
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;
        self.inner.remember_session(&response);
        let response = check_status(response).await?;

        if response.status() == StatusCode::ACCEPTED {
            return Ok(());
        }
        if is_event_stream(&response) {
            let body: ByteStream = Box::pin(response.bytes_stream());
            tokio::spawn(Arc::clone(&self.inner).read_stream(body, StreamKind::Post));
            return Ok(());
        }

        let bytes = tokio::time::timeout(self.inner.config.request_timeout, response.bytes())
            .await
            .map_err(|_| TransportError::Timeout {
                operation: "reading response body".to_string(),
                duration: self.inner.config.request_timeout,
            })??;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(());
        }
        let messages: Vec<Message> = if bytes.trim_ascii_start().starts_with(b"[") {
            serde_json::from_slice(&bytes)?
        } else {
            vec![serde_json::from_slice(&bytes)?]
        };
        for msg in messages {
            if self.inner.incoming.send(Ok(msg)).is_err() {
                return Err(TransportError::ConnectionClosed);
            }
        }
        Ok(())
    }

    async fn recv(&self) -> Result<Option<Message>, Self::Error> {
        let mut incoming = self.incoming.lock().await;
        tokio::select! {
            msg = incoming.recv() => msg.transpose(),
            () = self.inner.closed.cancelled() => Ok(None),
        }
    }

    /// Terminate the session with `DELETE` and stop all streams.
    async fn close(&self) -> Result<(), Self::Error> {
        if self.inner.closed.is_cancelled() {
            return Ok(());
        }
        self.inner.closed.cancel();
        if lock(&self.inner.session_id).is_none() {
            return Ok(());
        }
        match self.inner.request(reqwest::Method::DELETE).send().await {
            Ok(response) if !response.status().is_success() => {
                debug!(status = %response.status(), "session DELETE rejected");
            }
            Ok(_) => debug!("session terminated"),
            Err(e) => warn!(error = %e, "failed to terminate session"),
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.inner.closed.is_cancelled()
    }

    fn metadata(&self) -> TransportMetadata {
        let mut metadata = self.metadata.clone();
        metadata.session_id = self.session_id();
        metadata
    }
}

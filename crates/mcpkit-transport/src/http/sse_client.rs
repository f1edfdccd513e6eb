//! Client side of the SSE transport.

use futures::StreamExt;
use mcpkit_core::protocol::Message;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::Url;

use super::config::HttpClientConfig;
use super::sse::{SseEvent, SseParser};
use super::{ByteStream, Incoming, build_client, check_status, deliver, pump_events, with_headers};
use crate::error::TransportError;
use crate::runtime::{AsyncMutex, CancellationToken};
use crate::traits::{Transport, TransportMetadata};

/// A client connected to an SSE server.
///
/// [`connect`](Self::connect) opens the event stream and waits for the
/// `endpoint` event; messages are then POSTed to that endpoint one at a
/// time.
pub struct SseClientTransport {
    client: reqwest::Client,
    config: HttpClientConfig,
    endpoint: Url,
    incoming: AsyncMutex<mpsc::UnboundedReceiver<Result<Message, TransportError>>>,
    closed: CancellationToken,
    metadata: TransportMetadata,
}

impl SseClientTransport {
    /// Open the event stream at `config.url`.
    pub async fn connect(config: HttpClientConfig) -> Result<Self, TransportError> {
        let client = build_client(&config)?;
        let base = Url::parse(&config.url)
            .map_err(|e| TransportError::connection(format!("Invalid URL {}: {e}", config.url)))?;

        let response = with_headers(client.get(base.clone()), &config)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;
        let response = check_status(response).await?;

        let mut body: ByteStream = Box::pin(response.bytes_stream());
        let mut parser = SseParser::new(config.max_message_size);
        let (endpoint, backlog) = tokio::time::timeout(
            config.request_timeout,
            wait_for_endpoint(&mut body, &mut parser),
        )
        .await
        .map_err(|_| TransportError::Timeout {
            operation: "waiting for the endpoint event".to_string(),
            duration: config.request_timeout,
        })??;
        let endpoint = base.join(&endpoint).map_err(|e| {
            TransportError::protocol(format!("Invalid endpoint {endpoint}: {e}"))
        })?;
        info!(endpoint = %endpoint, "SSE session established");

        let (tx, rx) = mpsc::unbounded_channel();
        let closed = CancellationToken::new();
        tokio::spawn(read_events(body, parser, backlog, tx, closed.clone()));

        let session_id = endpoint
            .query_pairs()
            .find(|(k, _)| k == super::SESSION_ID_PARAM)
            .map(|(_, v)| v.into_owned());
        let mut metadata = TransportMetadata::new("sse")
            .remote_addr(config.url.clone())
            .connected_now();
        if let Some(session_id) = session_id {
            metadata = metadata.session_id(session_id);
        }

        Ok(Self {
            client,
            config,
            endpoint,
            incoming: AsyncMutex::new(rx),
            closed,
            metadata,
        })
    }

    /// The URL messages are POSTed to.
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

async fn wait_for_endpoint(
    body: &mut ByteStream,
    parser: &mut SseParser,
) -> Result<(String, Vec<SseEvent>), TransportError> {
    loop {
        let chunk = body.next().await.ok_or_else(|| {
            TransportError::connection("Event stream ended before the endpoint event")
        })??;
        let mut events = parser.push(&chunk)?;
        if let Some(pos) = events.iter().position(|e| e.name() == "endpoint") {
            let backlog = events.split_off(pos + 1);
            let endpoint = events.swap_remove(pos).data;
            return Ok((endpoint, backlog));
        }
    }
}

async fn read_events(
    body: ByteStream,
    mut parser: SseParser,
    backlog: Vec<SseEvent>,
    incoming: Incoming,
    closed: CancellationToken,
) {
    for event in &backlog {
        if !deliver(event, &incoming) {
            return;
        }
    }
    let mut last_event_id = None;
    match pump_events(body, &mut parser, &mut last_event_id, &incoming, &closed).await {
        Ok(()) => debug!("SSE event stream ended"),
        Err(e) => {
            warn!(error = %e, "SSE event stream failed");
            let _ = incoming.send(Err(e));
        }
    }
}

impl Transport for SseClientTransport {
    type Error = TransportError;

    async fn send(&self, msg: Message) -> Result<(), Self::Error> {
        if self.closed.is_cancelled() {
            return Err(TransportError::ConnectionClosed);
        }
        let body = serde_json::to_vec(&msg)?;
        let response = with_headers(self.client.post(self.endpoint.clone()), &self.config)
            .header(CONTENT_TYPE, "application/json")
            .timeout(self.config.request_timeout)
            .body(body)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    async fn recv(&self) -> Result<Option<Message>, Self::Error> {
        let mut incoming = self.incoming.lock().await;
        tokio::select! {
            msg = incoming.recv() => msg.transpose(),
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

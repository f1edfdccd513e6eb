//! Standard I/O and pipe transports.
//!
//! [`IoTransport`] speaks newline-delimited JSON over any async reader and
//! writer pair. It is the framing used by MCP servers launched as
//! subprocesses, by [`StdioTransport`] and by the in-memory test pair.
//!
//! # Batching
//!
//! A line holding a JSON array is an incoming batch. Its messages are
//! delivered one at a time by `recv`, and the responses to its requests are
//! held back until every request in the batch has been answered, then
//! written together as one array. A batch that repeats a request id fails
//! the connection.
//!
//! With [`IoTransport::with_batch_size`] set to `n > 0`, outgoing requests
//! and notifications are buffered and written as one array once `n` have
//! accumulated. Responses are never buffered this way, and the
//! `initialize` / `notifications/initialized` handshake is always written
//! immediately so that it cannot stall in a half-full buffer.
//!
//! # Example
//!
//! ```no_run
//! use mcpkit_transport::stdio::StdioTransport;
//!
//! let transport = StdioTransport::new();
//! ```

use std::collections::{HashMap, HashSet, VecDeque};

use mcpkit_core::methods;
use mcpkit_core::protocol::{Message, RequestId, Response};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, trace, warn};

use crate::error::TransportError;
use crate::runtime::{AsyncMutex, CancellationToken, lock};
use crate::traits::{Transport, TransportMetadata};

/// Maximum message size (16 MB).
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// A newline-delimited JSON transport over an async reader and writer.
pub struct IoTransport<R, W> {
    read: AsyncMutex<ReadState<R>>,
    write: AsyncMutex<WriteState<W>>,
    batches: std::sync::Mutex<IncomingBatches>,
    batch_size: usize,
    closed: CancellationToken,
    metadata: TransportMetadata,
}

struct ReadState<R> {
    reader: BufReader<R>,
    queued: VecDeque<Message>,
}

struct WriteState<W> {
    writer: Option<W>,
    outgoing: Vec<Message>,
}

/// Incoming batches whose responses have not all been written yet.
#[derive(Default)]
struct IncomingBatches {
    next_id: u64,
    by_request: HashMap<RequestId, u64>,
    pending: HashMap<u64, PendingBatch>,
}

struct PendingBatch {
    waiting: HashSet<RequestId>,
    responses: Vec<Response>,
}

enum Routed {
    Direct(Response),
    Held,
    Complete(Vec<Response>),
}

impl<R, W> IoTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Create a transport reading from `reader` and writing to `writer`.
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            read: AsyncMutex::new(ReadState {
                reader: BufReader::new(reader),
                queued: VecDeque::new(),
            }),
            write: AsyncMutex::new(WriteState {
                writer: Some(writer),
                outgoing: Vec::new(),
            }),
            batches: std::sync::Mutex::new(IncomingBatches::default()),
            batch_size: 0,
            closed: CancellationToken::new(),
            metadata: TransportMetadata::new("io").connected_now(),
        }
    }

    /// Buffer outgoing requests and notifications into arrays of `size`.
    ///
    /// Zero disables outgoing batching.
    #[must_use]
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub(crate) fn with_metadata(mut self, metadata: TransportMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Record the requests of an incoming batch so their responses are
    /// grouped on output.
    fn register_batch(&self, messages: &[Message]) -> Result<(), TransportError> {
        let mut ids = HashSet::new();
        for msg in messages {
            if let Message::Request(req) = msg {
                if !ids.insert(req.id.clone()) {
                    return Err(TransportError::protocol(format!(
                        "duplicate request id {} in batch",
                        req.id
                    )));
                }
            }
        }
        if ids.is_empty() {
            return Ok(());
        }

        let mut batches = lock(&self.batches);
        let batch_id = batches.next_id;
        batches.next_id += 1;
        for id in &ids {
            batches.by_request.insert(id.clone(), batch_id);
        }
        batches.pending.insert(
            batch_id,
            PendingBatch {
                waiting: ids,
                responses: Vec::new(),
            },
        );
        Ok(())
    }

    fn route_response(&self, response: Response) -> Routed {
        let mut batches = lock(&self.batches);
        let Some(batch_id) = batches.by_request.remove(&response.id) else {
            return Routed::Direct(response);
        };
        let Some(batch) = batches.pending.get_mut(&batch_id) else {
            return Routed::Direct(response);
        };
        batch.waiting.remove(&response.id);
        batch.responses.push(response);
        if !batch.waiting.is_empty() {
            return Routed::Held;
        }
        batches
            .pending
            .remove(&batch_id)
            .map_or(Routed::Held, |batch| Routed::Complete(batch.responses))
    }

    async fn write_line<T: Serialize + ?Sized>(
        state: &mut WriteState<W>,
        value: &T,
    ) -> Result<(), TransportError> {
        let mut json = serde_json::to_vec(value)?;
        if json.len() > MAX_MESSAGE_SIZE {
            return Err(TransportError::MessageTooLarge {
                size: json.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }
        json.push(b'\n');

        let writer = state
            .writer
            .as_mut()
            .ok_or(TransportError::ConnectionClosed)?;
        writer.write_all(&json).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn flush_outgoing(state: &mut WriteState<W>) -> Result<(), TransportError> {
        if state.outgoing.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut state.outgoing);
        trace!(len = batch.len(), "flushing outgoing batch");
        Self::write_line(state, &batch).await
    }

    fn parse_line(&self, line: &str) -> Result<Vec<Message>, TransportError> {
        if line.starts_with('[') {
            let messages: Vec<Message> = serde_json::from_str(line)?;
            self.register_batch(&messages)?;
            debug!(len = messages.len(), "received batch");
            Ok(messages)
        } else {
            Ok(vec![serde_json::from_str(line)?])
        }
    }
}

fn is_handshake(msg: &Message) -> bool {
    matches!(
        msg.method(),
        Some(methods::INITIALIZE | methods::NOTIFICATION_INITIALIZED)
    )
}

impl<R, W> Transport for IoTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    type Error = TransportError;

    async fn send(&self, msg: Message) -> Result<(), Self::Error> {
        if self.closed.is_cancelled() {
            return Err(TransportError::ConnectionClosed);
        }

        match msg {
            Message::Response(response) => match self.route_response(response) {
                Routed::Held => Ok(()),
                Routed::Direct(response) => {
                    let mut state = self.write.lock().await;
                    Self::flush_outgoing(&mut state).await?;
                    Self::write_line(&mut state, &response).await
                }
                Routed::Complete(responses) => {
                    let mut state = self.write.lock().await;
                    Self::flush_outgoing(&mut state).await?;
                    Self::write_line(&mut state, &responses).await
                }
            },
            msg if self.batch_size > 0 && !is_handshake(&msg) => {
                let mut state = self.write.lock().await;
                state.outgoing.push(msg);
                if state.outgoing.len() >= self.batch_size {
                    Self::flush_outgoing(&mut state).await?;
                }
                Ok(())
            }
            msg => {
                let mut state = self.write.lock().await;
                Self::write_line(&mut state, &msg).await
            }
        }
    }

    async fn recv(&self) -> Result<Option<Message>, Self::Error> {
        if self.closed.is_cancelled() {
            return Err(TransportError::ConnectionClosed);
        }

        let mut read = self.read.lock().await;
        loop {
            if let Some(msg) = read.queued.pop_front() {
                return Ok(Some(msg));
            }

            let mut line = String::new();
            let bytes_read = tokio::select! {
                result = read.reader.read_line(&mut line) => result?,
                () = self.closed.cancelled() => return Err(TransportError::ConnectionClosed),
            };
            if bytes_read == 0 {
                return Ok(None);
            }
            if line.len() > MAX_MESSAGE_SIZE {
                return Err(TransportError::MessageTooLarge {
                    size: line.len(),
                    max: MAX_MESSAGE_SIZE,
                });
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match self.parse_line(trimmed) {
                Ok(messages) => {
                    if messages.is_empty() {
                        warn!("ignoring empty batch");
                    }
                    read.queued.extend(messages);
                }
                Err(err @ TransportError::Protocol { .. }) => {
                    self.closed.cancel();
                    return Err(err);
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.closed.cancel();

        let mut state = self.write.lock().await;
        if let Err(err) = Self::flush_outgoing(&mut state).await {
            debug!(error = %err, "dropping buffered messages on close");
        }
        if let Some(mut writer) = state.writer.take() {
            // Dropping the writer after shutdown closes the pipe.
            let _ = writer.shutdown().await;
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.closed.is_cancelled()
    }

    fn metadata(&self) -> TransportMetadata {
        self.metadata.clone()
    }
}

/// A transport over the process's standard input and output.
pub struct StdioTransport {
    inner: IoTransport<tokio::io::Stdin, tokio::io::Stdout>,
}

impl StdioTransport {
    /// Create a transport over stdin and stdout.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: IoTransport::new(tokio::io::stdin(), tokio::io::stdout()).with_metadata(
                TransportMetadata::new("stdio")
                    .remote_addr("stdin")
                    .local_addr("stdout")
                    .connected_now(),
            ),
        }
    }

    /// Buffer outgoing requests and notifications into arrays of `size`.
    #[must_use]
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.inner = self.inner.with_batch_size(size);
        self
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for StdioTransport {
    type Error = TransportError;

    async fn send(&self, msg: Message) -> Result<(), Self::Error> {
        self.inner.send(msg).await
    }

    async fn recv(&self) -> Result<Option<Message>, Self::Error> {
        self.inner.recv().await
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.inner.close().await
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    fn metadata(&self) -> TransportMetadata {
        self.inner.metadata()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpkit_core::protocol::{Notification, Request};
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};
    use std::time::Duration;
    use tokio::io::{DuplexStream, ReadHalf, WriteHalf};

    type Half = IoTransport<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;

    /// A transport plus the raw far end of both of its pipes.
    fn harness() -> (Half, BufReader<DuplexStream>, DuplexStream) {
        let (ours_in, theirs_out) = tokio::io::duplex(64 * 1024);
        let (ours_out, theirs_in) = tokio::io::duplex(64 * 1024);
        let (reader, _) = tokio::io::split(ours_in);
        let (_, writer) = tokio::io::split(ours_out);
        (
            IoTransport::new(reader, writer),
            BufReader::new(theirs_in),
            theirs_out,
        )
    }

    async fn read_json(peer: &mut BufReader<DuplexStream>) -> Value {
        let mut line = String::new();
        peer.read_line(&mut line).await.unwrap();
        serde_json::from_str(&line).unwrap()
    }

    #[tokio::test]
    async fn test_single_messages() {
        let (transport, mut peer_in, mut peer_out) = harness();

        peer_out
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n\n")
            .await
            .unwrap();
        let msg = transport.recv().await.unwrap().unwrap();
        assert_eq!(msg.method(), Some("ping"));

        transport
            .send(Response::success(1, json!({})).into())
            .await
            .unwrap();
        assert_eq!(
            read_json(&mut peer_in).await,
            json!({"jsonrpc": "2.0", "id": 1, "result": {}})
        );
    }

    #[tokio::test]
    async fn test_eof_is_none() {
        let (transport, _peer_in, peer_out) = harness();
        drop(peer_out);
        assert!(transport.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_incoming_batch_responses_are_grouped() {
        let (transport, mut peer_in, mut peer_out) = harness();

        let batch = json!([
            {"jsonrpc": "2.0", "id": 1, "method": "ping"},
            {"jsonrpc": "2.0", "method": "notifications/progress", "params": {"progressToken": 1, "progress": 1}},
            {"jsonrpc": "2.0", "id": 2, "method": "ping"},
        ]);
        peer_out
            .write_all(format!("{batch}\n").as_bytes())
            .await
            .unwrap();

        let mut methods = Vec::new();
        for _ in 0..3 {
            let msg = transport.recv().await.unwrap().unwrap();
            methods.push(msg.method().unwrap_or_default().to_string());
        }
        assert_eq!(methods, ["ping", "notifications/progress", "ping"]);

        // Answer out of order; nothing is written until both are answered.
        transport
            .send(Response::success(2, json!({"n": 2})).into())
            .await
            .unwrap();
        let early = tokio::time::timeout(Duration::from_millis(50), read_json(&mut peer_in)).await;
        assert!(early.is_err());

        transport
            .send(Response::success(1, json!({"n": 1})).into())
            .await
            .unwrap();
        assert_eq!(
            read_json(&mut peer_in).await,
            json!([
                {"jsonrpc": "2.0", "id": 2, "result": {"n": 2}},
                {"jsonrpc": "2.0", "id": 1, "result": {"n": 1}},
            ])
        );
    }

    #[tokio::test]
    async fn test_duplicate_id_in_batch_fails_connection() {
        let (transport, _peer_in, mut peer_out) = harness();
        let batch = json!([
            {"jsonrpc": "2.0", "id": 1, "method": "ping"},
            {"jsonrpc": "2.0", "id": 1, "method": "tools/list"},
        ]);
        peer_out
            .write_all(format!("{batch}\n").as_bytes())
            .await
            .unwrap();

        let err = transport.recv().await.unwrap_err();
        assert!(matches!(err, TransportError::Protocol { .. }));
        assert!(!transport.is_connected());
        assert!(transport.recv().await.is_err());
    }

    #[tokio::test]
    async fn test_outgoing_batch_size_two() {
        let (transport, mut peer_in, _peer_out) = harness();
        let transport = transport.with_batch_size(2);

        transport
            .send(Notification::new("notifications/tools/list_changed").into())
            .await
            .unwrap();
        let early = tokio::time::timeout(Duration::from_millis(50), read_json(&mut peer_in)).await;
        assert!(early.is_err(), "first write must stay buffered");

        transport.send(Request::new("ping", 7).into()).await.unwrap();
        let batch = read_json(&mut peer_in).await;
        let batch = batch.as_array().unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0]["method"], "notifications/tools/list_changed");
        assert_eq!(batch[1]["id"], 7);
    }

    #[tokio::test]
    async fn test_handshake_is_never_batched() {
        let (transport, mut peer_in, _peer_out) = harness();
        let transport = transport.with_batch_size(2);

        transport
            .send(Request::new("initialize", 1).into())
            .await
            .unwrap();
        assert_eq!(read_json(&mut peer_in).await["method"], "initialize");

        transport
            .send(Notification::new("notifications/initialized").into())
            .await
            .unwrap();
        assert_eq!(
            read_json(&mut peer_in).await["method"],
            "notifications/initialized"
        );
    }

    #[tokio::test]
    async fn test_close_unblocks_recv() {
        let (transport, _peer_in, _peer_out) = harness();
        let transport = std::sync::Arc::new(transport);

        let reader = {
            let transport = std::sync::Arc::clone(&transport);
            tokio::spawn(async move { transport.recv().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        transport.close().await.unwrap();
        transport.close().await.unwrap();

        let result = reader.await.unwrap();
        assert!(matches!(result, Err(TransportError::ConnectionClosed)));
        assert!(transport.send(Request::new("ping", 1).into()).await.is_err());
    }

    #[tokio::test]
    async fn test_close_flushes_partial_batch_and_ends_stream() {
        let (transport, mut peer_in, _peer_out) = harness();
        let transport = transport.with_batch_size(4);

        transport
            .send(Notification::new("notifications/progress").into())
            .await
            .unwrap();
        transport.close().await.unwrap();

        let batch = read_json(&mut peer_in).await;
        assert_eq!(batch.as_array().map(Vec::len), Some(1));

        let mut rest = String::new();
        assert_eq!(peer_in.read_line(&mut rest).await.unwrap(), 0);
    }
}

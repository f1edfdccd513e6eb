//! A transport wrapper that records traffic.
//!
//! [`LoggingTransport`] delegates to another transport and writes one line
//! per message to a sink: `read: <json>` for received messages and
//! `write: <json>` for sent ones. Every message is also traced at `trace`
//! level with its method and running count.

use std::io::Write;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use mcpkit_core::protocol::Message;
use tracing::{debug, trace, warn};

use crate::runtime::lock;
use crate::traits::{Transport, TransportMetadata};

/// A transport wrapped with traffic logging.
pub struct LoggingTransport<T, W> {
    inner: T,
    sink: Mutex<W>,
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
}

impl<T, W> LoggingTransport<T, W> {
    /// Wrap `inner`, writing traffic lines to `sink`.
    pub fn new(inner: T, sink: W) -> Self {
        Self {
            inner,
            sink: Mutex::new(sink),
            messages_sent: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
        }
    }

    /// Get the number of messages sent.
    pub fn messages_sent(&self) -> u64 {
        self.messages_sent.load(Ordering::Relaxed)
    }

    /// Get the number of messages received.
    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    /// Unwrap into the inner transport and the sink.
    pub fn into_parts(self) -> (T, W) {
        let sink = self
            .sink
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        (self.inner, sink)
    }
}

impl<T, W: Write> LoggingTransport<T, W> {
    fn record(&self, direction: &str, msg: &Message) {
        let line = match serde_json::to_string(msg) {
            Ok(json) => format!("{direction}: {json}\n"),
            Err(err) => format!("{direction}: <unserializable: {err}>\n"),
        };
        let mut sink = lock(&self.sink);
        if let Err(err) = sink.write_all(line.as_bytes()).and_then(|()| sink.flush()) {
            warn!(error = %err, "failed to write traffic log");
        }
    }
}

impl<T, W> Transport for LoggingTransport<T, W>
where
    T: Transport,
    W: Write + Send,
{
    type Error = T::Error;

    async fn send(&self, msg: Message) -> Result<(), Self::Error> {
        let count = self.messages_sent.fetch_add(1, Ordering::Relaxed) + 1;
        trace!(count, method = msg.method().unwrap_or("<response>"), "sending message");
        self.record("write", &msg);
        self.inner.send(msg).await
    }

    async fn recv(&self) -> Result<Option<Message>, Self::Error> {
        let result = self.inner.recv().await?;
        if let Some(ref msg) = result {
            let count = self.messages_received.fetch_add(1, Ordering::Relaxed) + 1;
            trace!(count, method = msg.method().unwrap_or("<response>"), "received message");
            self.record("read", msg);
        }
        Ok(result)
    }

    async fn close(&self) -> Result<(), Self::Error> {
        debug!(
            sent = self.messages_sent(),
            received = self.messages_received(),
            "closing transport"
        );
        self.inner.close().await
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    fn metadata(&self) -> TransportMetadata {
        self.inner.metadata()
    }
}

//! Transport traits for the MCP protocol.
//!
//! - [`Transport`]: bidirectional message passing, one value per connection
//! - [`DynTransport`]: the object-safe form used by sessions
//! - [`with_related_request`] / [`related_request`]: the id of the incoming
//!   request a task is currently handling, used to route outgoing traffic
//!
//! # Example
//!
//! ```rust
//! use mcpkit_transport::{Transport, memory};
//!
//! let (client, server) = memory::pair();
//! assert!(client.is_connected());
//! assert!(server.is_connected());
//! ```

use std::future::Future;
use std::time::Instant;

use futures::future::BoxFuture;
use mcpkit_core::error::McpError;
use mcpkit_core::protocol::{Message, RequestId};

/// Metadata about a transport connection.
#[derive(Debug, Clone, Default)]
pub struct TransportMetadata {
    /// Transport type identifier (e.g., "stdio", "sse", "streamable-http").
    pub transport_type: String,
    /// Remote address, if applicable.
    pub remote_addr: Option<String>,
    /// Local address, if applicable.
    pub local_addr: Option<String>,
    /// When the connection was established.
    pub connected_at: Option<Instant>,
    /// HTTP session id, for HTTP transports.
    pub session_id: Option<String>,
}

impl TransportMetadata {
    /// Create new metadata for a transport type.
    #[must_use]
    pub fn new(transport_type: impl Into<String>) -> Self {
        Self {
            transport_type: transport_type.into(),
            ..Self::default()
        }
    }

    /// Set the remote address.
    #[must_use]
    pub fn remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }

    /// Set the local address.
    #[must_use]
    pub fn local_addr(mut self, addr: impl Into<String>) -> Self {
        self.local_addr = Some(addr.into());
        self
    }

    /// Set the HTTP session id.
    #[must_use]
    pub fn session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    /// Mark the connection time.
    #[must_use]
    pub fn connected_now(mut self) -> Self {
        self.connected_at = Some(Instant::now());
        self
    }
}

/// Core transport trait for MCP communication.
///
/// A transport is one connected, bidirectional stream of JSON-RPC messages.
/// `send` and `recv` may be called concurrently from different tasks; `recv`
/// is only ever called from one task at a time.
///
/// `recv` returns `Ok(None)` when the peer ends the stream cleanly. After
/// `close`, any pending or later `recv` resolves promptly, and `close` itself
/// is idempotent.
pub trait Transport: Send + Sync {
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync + Into<McpError> + 'static;

    /// Send a message over the transport.
    fn send(&self, msg: Message) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Receive the next message, or `None` at end of stream.
    fn recv(&self) -> impl Future<Output = Result<Option<Message>, Self::Error>> + Send;

    /// Close the transport connection.
    fn close(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Check if the transport is still connected.
    fn is_connected(&self) -> bool;

    /// Get metadata about the transport.
    fn metadata(&self) -> TransportMetadata;
}

/// Object-safe view of a [`Transport`], with errors mapped to [`McpError`].
///
/// Every `Transport` implements this, so sessions can hold any transport as
/// `Arc<dyn DynTransport>`.
pub trait DynTransport: Send + Sync {
    /// Send a message.
    fn send_dyn(&self, msg: Message) -> BoxFuture<'_, Result<(), McpError>>;
    /// Receive the next message.
    fn recv_dyn(&self) -> BoxFuture<'_, Result<Option<Message>, McpError>>;
    /// Close the connection.
    fn close_dyn(&self) -> BoxFuture<'_, Result<(), McpError>>;
    /// Whether the transport is still connected.
    fn is_connected_dyn(&self) -> bool;
    /// Transport metadata.
    fn metadata_dyn(&self) -> TransportMetadata;
}

impl<T: Transport> DynTransport for T {
    fn send_dyn(&self, msg: Message) -> BoxFuture<'_, Result<(), McpError>> {
        Box::pin(async move { self.send(msg).await.map_err(Into::into) })
    }

    fn recv_dyn(&self) -> BoxFuture<'_, Result<Option<Message>, McpError>> {
        Box::pin(async move { self.recv().await.map_err(Into::into) })
    }

    fn close_dyn(&self) -> BoxFuture<'_, Result<(), McpError>> {
        Box::pin(async move { self.close().await.map_err(Into::into) })
    }

    fn is_connected_dyn(&self) -> bool {
        self.is_connected()
    }

    fn metadata_dyn(&self) -> TransportMetadata {
        self.metadata()
    }
}

tokio::task_local! {
    static RELATED_REQUEST: RequestId;
}

/// Run `fut` with `id` recorded as the request it is handling.
///
/// Sessions wrap every incoming request handler in this scope. Transports
/// that multiplex logical streams read it back with [`related_request`] to
/// tag outgoing traffic.
pub async fn with_related_request<F: Future>(id: RequestId, fut: F) -> F::Output {
    RELATED_REQUEST.scope(id, fut).await
}

/// The id of the incoming request the current task is handling, if any.
#[must_use]
pub fn related_request() -> Option<RequestId> {
    RELATED_REQUEST.try_with(Clone::clone).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_metadata_builder() {
        let meta = TransportMetadata::new("stdio")
            .remote_addr("stdin")
            .local_addr("stdout")
            .session_id("abc")
            .connected_now();

        assert_eq!(meta.transport_type, "stdio");
        assert_eq!(meta.session_id.as_deref(), Some("abc"));
        assert!(meta.remote_addr.is_some());
        assert!(meta.connected_at.is_some());
    }

    #[tokio::test]
    async fn test_related_request_scope() {
        assert_eq!(related_request(), None);
        let seen = with_related_request(RequestId::from(7), async { related_request() }).await;
        assert_eq!(seen, Some(RequestId::from(7)));
        assert_eq!(related_request(), None);
    }

    #[tokio::test]
    async fn test_related_request_not_inherited_by_spawned_tasks() {
        let seen = with_related_request(RequestId::from("a"), async {
            tokio::spawn(async { related_request() }).await.ok().flatten()
        })
        .await;
        assert_eq!(seen, None);
    }
}

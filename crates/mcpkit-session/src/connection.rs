//! The JSON-RPC endpoint underneath every session.
//!
//! A [`Connection`] owns one transport and runs a reader task over it:
//!
//! - responses resolve the matching pending call
//! - requests are handled concurrently, each on its own task with its own
//!   cancellation token, and answered when the handler returns
//! - notifications are handled in arrival order on the reader task
//! - `notifications/cancelled` cancels the referenced in-flight request,
//!   which is then answered with a cancellation error
//!
//! When the stream ends or the connection is closed, every pending call
//! fails with [`McpError::ConnectionClosed`] and every in-flight handler is
//! cancelled.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::BoxFuture;
use mcpkit_core::error::{JsonRpcError, McpError, TransportErrorKind};
use mcpkit_core::methods;
use mcpkit_core::protocol::{Message, Notification, Request, RequestId, Response};
use mcpkit_core::types::CancelledParams;
use mcpkit_transport::{DynTransport, Transport, TransportMetadata, with_related_request};
use serde_json::Value;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::context::Context;

/// Handles incoming requests and notifications.
///
/// Called with the request context, the method name and the raw params
/// (`null` when absent). For notifications the result is discarded.
pub type IncomingHandler =
    Arc<dyn Fn(Context, String, Value) -> BoxFuture<'static, Result<Value, McpError>> + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A JSON-RPC connection over a transport.
pub struct Connection {
    transport: Arc<dyn DynTransport>,
    next_id: AtomicU64,
    pending: Mutex<HashMap<RequestId, oneshot::Sender<Response>>>,
    in_flight: Mutex<HashMap<RequestId, CancellationToken>>,
    started: AtomicBool,
    closed: CancellationToken,
    finished: CancellationToken,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("transport", &self.transport.metadata_dyn().transport_type)
            .field("closed", &self.closed.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Wrap a transport. Nothing is read until [`start`](Self::start).
    pub fn new<T: Transport + 'static>(transport: T) -> Arc<Self> {
        Self::from_dyn(Arc::new(transport))
    }

    /// Wrap an already type-erased transport.
    pub fn from_dyn(transport: Arc<dyn DynTransport>) -> Arc<Self> {
        Arc::new(Self {
            transport,
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            started: AtomicBool::new(false),
            closed: CancellationToken::new(),
            finished: CancellationToken::new(),
        })
    }

    /// Spawn the reader task, dispatching incoming traffic to `handler`.
    ///
    /// Only the first call has any effect.
    pub fn start(self: &Arc<Self>, handler: IncomingHandler) {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("connection already started");
            return;
        }
        tokio::spawn(Arc::clone(self).read_loop(handler));
    }

    /// Metadata of the underlying transport.
    #[must_use]
    pub fn metadata(&self) -> TransportMetadata {
        self.transport.metadata_dyn()
    }

    /// Whether the connection has been closed by either side.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Completes once the reader task has stopped.
    pub async fn wait(&self) {
        self.finished.cancelled().await;
    }

    /// Issue a request and wait for its result.
    ///
    /// If `ctx` is cancelled first, the peer is sent `notifications/cancelled`
    /// and the call fails with [`McpError::Cancelled`]. Dropping the returned
    /// future has the same effect on the wire.
    pub async fn call(&self, ctx: &Context, method: &str, params: Value) -> Result<Value, McpError> {
        if self.is_closed() {
            return Err(McpError::ConnectionClosed);
        }

        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::Relaxed) as i64);
        let request = if params.is_null() {
            Request::new(method.to_string(), id.clone())
        } else {
            Request::with_params(method.to_string(), id.clone(), params)
        };

        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(id.clone(), tx);
        let mut guard = CallGuard {
            connection: self,
            id: Some(id.clone()),
        };

        trace!(%id, method, "sending request");
        if let Err(e) = self.transport.send_dyn(request.into()).await {
            guard.forget();
            return Err(e);
        }

        tokio::select! {
            response = rx => {
                guard.disarm();
                match response {
                    Ok(response) => response.into_result().map_err(McpError::from_rpc),
                    Err(_) => Err(McpError::ConnectionClosed),
                }
            }
            () = ctx.cancelled() => {
                debug!(%id, method, "call cancelled by caller");
                Err(McpError::cancelled(method.to_string()))
            }
            () = self.closed.cancelled() => {
                guard.forget();
                Err(McpError::ConnectionClosed)
            }
        }
    }

    /// Send a notification.
    pub async fn notify(&self, method: &str, params: Value) -> Result<(), McpError> {
        if self.is_closed() {
            return Err(McpError::ConnectionClosed);
        }
        let notification = if params.is_null() {
            Notification::new(method.to_string())
        } else {
            Notification::with_params(method.to_string(), params)
        };
        trace!(method, "sending notification");
        self.transport.send_dyn(notification.into()).await
    }

    /// Close the connection and its transport.
    ///
    /// Pending calls fail with [`McpError::ConnectionClosed`]. Closing twice
    /// is a no-op.
    pub async fn close(&self) -> Result<(), McpError> {
        if self.closed.is_cancelled() {
            return Ok(());
        }
        self.closed.cancel();
        self.shutdown();
        self.transport.close_dyn().await
    }

    fn shutdown(&self) {
        self.closed.cancel();
        let pending: Vec<_> = lock(&self.pending).drain().collect();
        if !pending.is_empty() {
            debug!(count = pending.len(), "failing pending calls");
        }
        for (_, token) in lock(&self.in_flight).drain() {
            token.cancel();
        }
    }

    async fn read_loop(self: Arc<Self>, handler: IncomingHandler) {
        loop {
            let next = tokio::select! {
                next = self.transport.recv_dyn() => next,
                () = self.closed.cancelled() => break,
            };
            match next {
                Ok(Some(Message::Response(response))) => self.resolve(response),
                Ok(Some(Message::Request(request))) => self.dispatch_request(request, &handler),
                Ok(Some(Message::Notification(notification))) => {
                    self.dispatch_notification(notification, &handler).await;
                }
                Ok(None) => {
                    debug!("peer closed the connection");
                    break;
                }
                Err(McpError::Transport(details))
                    if details.kind == TransportErrorKind::InvalidMessage =>
                {
                    warn!(error = %details.message, "dropping invalid message");
                }
                Err(e) => {
                    if !self.closed.is_cancelled() {
                        error!(error = %e, "connection failed");
                    }
                    break;
                }
            }
        }
        self.shutdown();
        self.finished.cancel();
    }

    fn resolve(&self, response: Response) {
        let Some(tx) = lock(&self.pending).remove(&response.id) else {
            // Also the case for a call the caller already cancelled.
            debug!(id = %response.id, "response for unknown request");
            return;
        };
        trace!(id = %response.id, "resolving call");
        // The caller may have given up already.
        let _ = tx.send(response);
    }

    fn dispatch_request(self: &Arc<Self>, request: Request, handler: &IncomingHandler) {
        let id = request.id.clone();
        let token = self.closed.child_token();
        lock(&self.in_flight).insert(id.clone(), token.clone());

        let params = request.params.unwrap_or(Value::Null);
        let ctx = Context::for_request(id.clone(), token.clone(), &params);
        let method = request.method.into_owned();
        let handler = Arc::clone(handler);
        let connection = Arc::clone(self);

        trace!(%id, method = %method, "handling request");
        tokio::spawn(with_related_request(id.clone(), async move {
            let result = handler(ctx, method.clone(), params).await;
            lock(&connection.in_flight).remove(&id);

            if connection.closed.is_cancelled() {
                debug!(%id, method = %method, "connection closed, not responding");
                return;
            }
            // Batches and HTTP streams stay open until every request is
            // answered, so a cancelled request still gets an error response.
            let response = match result {
                _ if token.is_cancelled() => {
                    debug!(%id, method = %method, "request cancelled by peer");
                    let err = McpError::cancelled(method.clone());
                    Response::error(id.clone(), JsonRpcError::from(&err))
                }
                Ok(value) => Response::success(id.clone(), value),
                Err(e) => {
                    debug!(%id, method = %method, error = %e, "request failed");
                    Response::error(id.clone(), JsonRpcError::from(&e))
                }
            };
            if let Err(e) = connection.transport.send_dyn(response.into()).await {
                warn!(%id, error = %e, "failed to send response");
            }
        }));
    }

    async fn dispatch_notification(&self, notification: Notification, handler: &IncomingHandler) {
        let method = notification.method.into_owned();
        let params = notification.params.unwrap_or(Value::Null);

        if method == methods::NOTIFICATION_CANCELLED {
            match serde_json::from_value::<CancelledParams>(params) {
                Ok(cancelled) => {
                    let token = lock(&self.in_flight).remove(&cancelled.request_id);
                    if let Some(token) = token {
                        debug!(id = %cancelled.request_id, reason = ?cancelled.reason, "peer cancelled request");
                        token.cancel();
                    }
                }
                Err(e) => warn!(error = %e, "malformed cancellation"),
            }
            return;
        }

        trace!(method = %method, "handling notification");
        if let Err(e) = handler(Context::new(), method.clone(), params).await {
            warn!(method = %method, error = %e, "notification handler failed");
        }
    }

    fn send_cancelled(&self, id: RequestId) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        if self.is_closed() {
            return;
        }
        let params = match serde_json::to_value(CancelledParams::new(id, None)) {
            Ok(params) => params,
            Err(e) => {
                warn!(error = %e, "failed to encode cancellation");
                return;
            }
        };
        let notification = Notification::with_params(methods::NOTIFICATION_CANCELLED, params);
        let transport = Arc::clone(&self.transport);
        runtime.spawn(async move {
            if let Err(e) = transport.send_dyn(notification.into()).await {
                debug!(error = %e, "failed to send cancellation");
            }
        });
    }
}

/// Tracks one outgoing call. Dropped while armed, it removes the pending
/// entry and tells the peer the call was cancelled.
struct CallGuard<'a> {
    connection: &'a Connection,
    id: Option<RequestId>,
}

impl CallGuard<'_> {
    /// The call finished normally.
    fn disarm(&mut self) {
        self.id = None;
    }

    /// The call can no longer be answered; drop it without telling the peer.
    fn forget(&mut self) {
        if let Some(id) = self.id.take() {
            lock(&self.connection.pending).remove(&id);
        }
    }
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            lock(&self.connection.pending).remove(&id);
            self.connection.send_cancelled(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpkit_transport::{LoggingTransport, memory};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;

    fn echo_handler() -> IncomingHandler {
        Arc::new(|_ctx, method, params| {
            Box::pin(async move {
                match method.as_str() {
                    "echo" => Ok(params),
                    "fail" => Err(McpError::invalid_params("fail", "bad input")),
                    other => Err(McpError::method_not_found(other)),
                }
            })
        })
    }

    fn connected_pair(server: IncomingHandler) -> (Arc<Connection>, Arc<Connection>) {
        let (a, b) = memory::pair();
        let client = Connection::new(a);
        let server_conn = Connection::new(b);
        client.start(Arc::new(|_, method, _| {
            Box::pin(async move { Err(McpError::method_not_found(method)) })
        }));
        server_conn.start(server);
        (client, server_conn)
    }

    #[tokio::test]
    async fn test_call_round_trip() {
        let (client, _server) = connected_pair(echo_handler());

        let result = client
            .call(&Context::new(), "echo", json!({"x": 1}))
            .await
            .unwrap();
        assert_eq!(result, json!({"x": 1}));

        let err = client
            .call(&Context::new(), "fail", Value::Null)
            .await
            .unwrap_err();
        assert_eq!(err.code(), mcpkit_core::error::codes::INVALID_PARAMS);

        let err = client
            .call(&Context::new(), "missing", Value::Null)
            .await
            .unwrap_err();
        assert_eq!(err.code(), mcpkit_core::error::codes::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_close_fails_pending_calls() {
        let handler: IncomingHandler = Arc::new(|ctx, _, _| {
            Box::pin(async move {
                ctx.cancelled().await;
                Ok(Value::Null)
            })
        });
        let (client, server) = connected_pair(handler);

        let call = {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.call(&Context::new(), "hang", Value::Null).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        server.close().await.unwrap();

        let err = call.await.unwrap().unwrap_err();
        assert!(err.is_connection_closed());
        client.wait().await;
        assert!(client.is_closed());
        assert!(matches!(
            client.call(&Context::new(), "echo", Value::Null).await,
            Err(McpError::ConnectionClosed)
        ));
    }

    /// A traffic log shared with the test after the transport is moved.
    #[derive(Clone, Default)]
    struct Traffic(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Traffic {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            lock(&self.0).extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Traffic {
        fn written(&self) -> Vec<Value> {
            let text = String::from_utf8(lock(&self.0).clone()).unwrap();
            text.lines()
                .filter_map(|line| line.strip_prefix("write: "))
                .map(|json| serde_json::from_str(json).unwrap())
                .collect()
        }
    }

    #[tokio::test]
    async fn test_cancellation_reaches_handler() {
        let (seen_tx, seen_rx) = oneshot::channel::<()>();
        let seen_tx = Arc::new(Mutex::new(Some(seen_tx)));
        let handler: IncomingHandler = Arc::new(move |ctx, _, _| {
            let seen_tx = Arc::clone(&seen_tx);
            Box::pin(async move {
                ctx.cancelled().await;
                if let Some(tx) = lock(&seen_tx).take() {
                    let _ = tx.send(());
                }
                Ok(Value::Null)
            })
        });

        let traffic = Traffic::default();
        let (a, b) = memory::pair();
        let client = Connection::new(LoggingTransport::new(a, traffic.clone()));
        client.start(echo_handler());
        let server = Connection::new(b);
        server.start(handler);

        let ctx = Context::new();
        let call = {
            let client = Arc::clone(&client);
            let ctx = ctx.clone();
            tokio::spawn(async move { client.call(&ctx, "slow", Value::Null).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        ctx.cancel();

        let err = call.await.unwrap().unwrap_err();
        assert!(err.is_cancelled());
        tokio::time::timeout(Duration::from_secs(5), seen_rx)
            .await
            .unwrap()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let written = traffic.written();
        let request_id = written
            .iter()
            .find(|msg| msg["method"] == "slow")
            .map(|msg| msg["id"].clone())
            .unwrap();
        let cancellations: Vec<_> = written
            .iter()
            .filter(|msg| msg["method"] == methods::NOTIFICATION_CANCELLED)
            .collect();
        assert_eq!(cancellations.len(), 1);
        assert_eq!(cancellations[0]["params"]["requestId"], request_id);
    }

    #[tokio::test]
    async fn test_cancelled_request_is_answered() {
        let handler: IncomingHandler = Arc::new(|ctx, _, _| {
            Box::pin(async move {
                ctx.cancelled().await;
                Ok(json!("finished anyway"))
            })
        });
        let traffic = Traffic::default();
        let (a, b) = memory::pair();
        let client = Connection::new(a);
        client.start(echo_handler());
        let server = Connection::new(LoggingTransport::new(b, traffic.clone()));
        server.start(handler);

        let ctx = Context::new();
        let call = {
            let client = Arc::clone(&client);
            let ctx = ctx.clone();
            tokio::spawn(async move { client.call(&ctx, "slow", Value::Null).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        ctx.cancel();
        assert!(call.await.unwrap().unwrap_err().is_cancelled());

        for _ in 0..100 {
            if !traffic.written().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let written = traffic.written();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0]["id"], json!(1));
        assert_eq!(
            written[0]["error"]["code"],
            json!(McpError::cancelled("slow").code())
        );
        assert!(written[0].get("result").is_none());
    }
}

//! The MCP client.
//!
//! A [`Client`] holds the roots it exposes and can be connected to any
//! number of servers. Each connection is a [`ClientSession`], returned once
//! the `initialize` handshake has completed. Changing the roots sends
//! `notifications/roots/list_changed` to every connected server.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use mcpkit_core::FeatureSet;
use mcpkit_core::capability::Implementation;
use mcpkit_core::error::McpError;
use mcpkit_core::methods;
use mcpkit_core::types::{ListChangedParams, Root};
use mcpkit_session::{
    Connection, Context, HandlerChain, MethodHandler, Middleware, Session, default_sender,
    send_notification,
};
use mcpkit_transport::{DynTransport, Transport};
use tracing::{debug, info, warn};

use crate::builder::ClientOptions;
use crate::router;
use crate::session::ClientSession;

/// How long one `roots/list_changed` notification may take per session.
pub const ROOTS_CHANGED_TIMEOUT: Duration = Duration::from_secs(10);

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn root_key(root: &Root) -> &str {
    &root.uri
}

pub(crate) struct ClientInner {
    pub(crate) info: Implementation,
    pub(crate) options: ClientOptions,
    pub(crate) roots: Mutex<FeatureSet<Root>>,
    sessions: Mutex<Vec<Arc<ClientSession>>>,
    receiving: Mutex<HandlerChain<ClientSession>>,
    sending: Mutex<HandlerChain<ClientSession>>,
}

impl ClientInner {
    pub(crate) fn sending_handler(&self) -> MethodHandler<ClientSession> {
        lock(&self.sending).handler()
    }

    fn receiving_handler(&self) -> MethodHandler<ClientSession> {
        lock(&self.receiving).handler()
    }

    fn remove_session(&self, session: &Arc<ClientSession>) {
        lock(&self.sessions).retain(|s| !Arc::ptr_eq(s, session));
    }
}

/// An MCP client. Cheap to clone; clones share roots and sessions.
///
/// # Example
///
/// ```no_run
/// use mcpkit_client::{Client, ClientOptions};
/// use mcpkit_core::capability::Implementation;
/// use mcpkit_core::types::{CallToolParams, Root};
/// use mcpkit_session::Context;
/// use mcpkit_transport::CommandTransport;
///
/// # async fn example() -> Result<(), mcpkit_core::error::McpError> {
/// let client = Client::new(Implementation::new("my-client", "1.0.0"), ClientOptions::default());
/// client.add_roots([Root::new("file:///tmp/data")]);
///
/// let transport = CommandTransport::spawn("my-server", &[] as &[&str])?;
/// let session = client.connect(transport).await?;
/// let ctx = Context::new();
/// let result = session
///     .call_tool(&ctx, &CallToolParams::new("greet", serde_json::json!({"name": "user"})))
///     .await?;
/// println!("{result:?}");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("info", &self.inner.info)
            .field("options", &self.inner.options)
            .field("sessions", &lock(&self.inner.sessions).len())
            .finish_non_exhaustive()
    }
}

impl Client {
    /// A client with no roots.
    #[must_use]
    pub fn new(info: Implementation, options: ClientOptions) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                info,
                options,
                roots: Mutex::new(FeatureSet::new(root_key)),
                sessions: Mutex::new(Vec::new()),
                receiving: Mutex::new(HandlerChain::new(router::receiving_table().into_handler())),
                sending: Mutex::new(HandlerChain::new(default_sender(router::CLIENT_SENDS))),
            }),
        }
    }

    /// Name and version sent in `initialize`.
    #[must_use]
    pub fn info(&self) -> &Implementation {
        &self.inner.info
    }

    /// Add or replace roots, then notify every session.
    pub fn add_roots(&self, roots: impl IntoIterator<Item = Root>) {
        lock(&self.inner.roots).add(roots);
        self.notify_all();
    }

    /// Remove roots by URI, notifying sessions if any were removed.
    pub fn remove_roots<'a>(&self, uris: impl IntoIterator<Item = &'a str>) {
        let removed = lock(&self.inner.roots).remove(uris);
        if removed {
            self.notify_all();
        }
    }

    /// The current roots, ordered by URI.
    #[must_use]
    pub fn roots(&self) -> Vec<Root> {
        lock(&self.inner.roots).all().cloned().collect()
    }

    /// Wrap the handler for incoming traffic. The first middleware listed
    /// runs outermost.
    pub fn add_receiving_middleware(&self, middleware: &[Middleware<ClientSession>]) {
        lock(&self.inner.receiving).add(middleware);
    }

    /// Wrap the handler for outgoing traffic, including the handshake.
    pub fn add_sending_middleware(&self, middleware: &[Middleware<ClientSession>]) {
        lock(&self.inner.sending).add(middleware);
    }

    /// Sessions currently connected.
    #[must_use]
    pub fn sessions(&self) -> Vec<Arc<ClientSession>> {
        lock(&self.inner.sessions).clone()
    }

    /// Connect to a server over `transport` and run the handshake.
    pub async fn connect<T: Transport + 'static>(&self, transport: T) -> Result<Arc<ClientSession>, McpError> {
        self.connect_dyn(Arc::new(transport)).await
    }

    /// Connect over a type-erased transport.
    ///
    /// If the handshake fails the connection is closed and the error
    /// returned.
    pub async fn connect_dyn(&self, transport: Arc<dyn DynTransport>) -> Result<Arc<ClientSession>, McpError> {
        let connection = Connection::from_dyn(transport);
        let session = Arc::new(ClientSession::new(
            Arc::clone(&self.inner),
            Arc::clone(&connection),
        ));

        let weak = Arc::downgrade(&session);
        let inner = Arc::clone(&self.inner);
        connection.start(Arc::new(move |ctx, method, params| {
            let Some(session) = weak.upgrade() else {
                return Box::pin(async { Err(McpError::ConnectionClosed) });
            };
            inner.receiving_handler()(ctx, session, method, params)
        }));

        if let Err(e) = session.handshake(&Context::new()).await {
            warn!(error = %e, "connect failed");
            if let Err(close_err) = connection.close().await {
                debug!(error = %close_err, "error closing connection after failed handshake");
            }
            return Err(e);
        }

        lock(&self.inner.sessions).push(Arc::clone(&session));
        let inner = Arc::clone(&self.inner);
        let reaped = Arc::clone(&session);
        tokio::spawn(async move {
            reaped.connection().wait().await;
            reaped.mark_closed();
            inner.remove_session(&reaped);
            info!("client session closed");
        });

        Ok(session)
    }

    /// Tell every session that the roots changed.
    fn notify_all(&self) {
        let sessions = self.sessions();
        if sessions.is_empty() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no runtime to send roots change notifications");
            return;
        };
        for session in sessions {
            runtime.spawn(async move {
                let params = ListChangedParams::default();
                let notify =
                    send_notification(&session, methods::NOTIFICATION_ROOTS_LIST_CHANGED, &params);
                match tokio::time::timeout(ROOTS_CHANGED_TIMEOUT, notify).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => debug!(error = %e, "roots change notification failed"),
                    Err(_) => warn!("roots change notification timed out"),
                }
            });
        }
    }
}

//! The MCP server.
//!
//! A [`Server`] holds the tool, prompt, resource and resource template
//! catalogs and can serve any number of sessions at once. Mutating a
//! catalog sends the matching `list_changed` notification to every
//! connected session.
//!
//! # Example
//!
//! ```rust
//! use mcpkit_core::capability::Implementation;
//! use mcpkit_core::types::CallToolResult;
//! use mcpkit_server::{Server, ServerOptions, ServerTool};
//! use schemars::JsonSchema;
//! use serde::Deserialize;
//!
//! #[derive(Deserialize, JsonSchema)]
//! struct Greet {
//!     name: String,
//! }
//!
//! let server = Server::new(Implementation::new("greeter", "1.0.0"), ServerOptions::default());
//! server.add_tools([ServerTool::typed("greet", "Say hi", |_ctx, _session, args: Greet| async move {
//!     Ok::<_, String>(CallToolResult::text(format!("hi {}", args.name)))
//! })]);
//! assert_eq!(server.tool_names(), vec!["greet".to_string()]);
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use mcpkit_core::capability::{Implementation, ServerCapabilities};
use mcpkit_core::error::McpError;
use mcpkit_core::methods;
use mcpkit_core::types::ListChangedParams;
use mcpkit_core::FeatureSet;
use mcpkit_session::{
    Connection, HandlerChain, MethodHandler, Middleware, Session, check_initialized,
    default_sender, send_notification,
};
use mcpkit_transport::{DynTransport, Transport};
use tracing::{debug, info, warn};

use crate::builder::ServerOptions;
use crate::capability::prompts::prompt_key;
use crate::capability::resources::{resource_key, template_key, validate_uri};
use crate::capability::tools::tool_key;
use crate::capability::{ServerPrompt, ServerResource, ServerResourceTemplate, ServerTool};
use crate::router;
use crate::session::ServerSession;

/// How long one `list_changed` notification may take per session.
pub const LIST_CHANGED_TIMEOUT: Duration = Duration::from_secs(10);

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) struct Features {
    pub(crate) tools: FeatureSet<ServerTool>,
    pub(crate) prompts: FeatureSet<ServerPrompt>,
    pub(crate) resources: FeatureSet<ServerResource>,
    pub(crate) templates: FeatureSet<ServerResourceTemplate>,
}

pub(crate) struct ServerInner {
    pub(crate) info: Implementation,
    pub(crate) options: ServerOptions,
    pub(crate) features: Mutex<Features>,
    sessions: Mutex<Vec<Arc<ServerSession>>>,
    receiving: Mutex<HandlerChain<ServerSession>>,
    sending: Mutex<HandlerChain<ServerSession>>,
}

impl ServerInner {
    pub(crate) fn receiving_handler(&self) -> MethodHandler<ServerSession> {
        lock(&self.receiving).handler()
    }

    pub(crate) fn sending_handler(&self) -> MethodHandler<ServerSession> {
        lock(&self.sending).handler()
    }

    pub(crate) fn capabilities() -> ServerCapabilities {
        ServerCapabilities::new()
            .with_prompts()
            .with_resources()
            .with_tools()
            .with_logging()
    }

    fn remove_session(&self, session: &Arc<ServerSession>) {
        lock(&self.sessions).retain(|s| !Arc::ptr_eq(s, session));
    }
}

/// An MCP server. Cheap to clone; clones share catalogs and sessions.
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("info", &self.inner.info)
            .field("options", &self.inner.options)
            .field("sessions", &lock(&self.inner.sessions).len())
            .finish_non_exhaustive()
    }
}

impl Server {
    /// A server with empty catalogs.
    #[must_use]
    pub fn new(info: Implementation, options: ServerOptions) -> Self {
        Self {
            inner: Arc::new(ServerInner {
                info,
                options,
                features: Mutex::new(Features {
                    tools: FeatureSet::new(tool_key),
                    prompts: FeatureSet::new(prompt_key),
                    resources: FeatureSet::new(resource_key),
                    templates: FeatureSet::new(template_key),
                }),
                sessions: Mutex::new(Vec::new()),
                receiving: Mutex::new(HandlerChain::new(router::receiving_table().into_handler())),
                sending: Mutex::new(HandlerChain::new(default_sender(router::SERVER_SENDS))),
            }),
        }
    }

    /// Name and version sent in `initialize`.
    #[must_use]
    pub fn info(&self) -> &Implementation {
        &self.inner.info
    }

    /// Capabilities sent in `initialize`.
    #[must_use]
    pub fn capabilities(&self) -> ServerCapabilities {
        ServerInner::capabilities()
    }

    /// Add or replace tools, then notify every session.
    pub fn add_tools(&self, tools: impl IntoIterator<Item = ServerTool>) {
        lock(&self.inner.features).tools.add(tools);
        self.notify_all(methods::NOTIFICATION_TOOLS_LIST_CHANGED);
    }

    /// Remove tools by name, notifying sessions if any were removed.
    pub fn remove_tools<'a>(&self, names: impl IntoIterator<Item = &'a str>) {
        let removed = lock(&self.inner.features).tools.remove(names);
        if removed {
            self.notify_all(methods::NOTIFICATION_TOOLS_LIST_CHANGED);
        }
    }

    /// Add or replace prompts, then notify every session.
    pub fn add_prompts(&self, prompts: impl IntoIterator<Item = ServerPrompt>) {
        lock(&self.inner.features).prompts.add(prompts);
        self.notify_all(methods::NOTIFICATION_PROMPTS_LIST_CHANGED);
    }

    /// Remove prompts by name, notifying sessions if any were removed.
    pub fn remove_prompts<'a>(&self, names: impl IntoIterator<Item = &'a str>) {
        let removed = lock(&self.inner.features).prompts.remove(names);
        if removed {
            self.notify_all(methods::NOTIFICATION_PROMPTS_LIST_CHANGED);
        }
    }

    /// Add or replace resources, then notify every session.
    ///
    /// Fails without adding anything if a URI does not parse or has no
    /// scheme.
    pub fn add_resources(&self, resources: impl IntoIterator<Item = ServerResource>) -> Result<(), McpError> {
        let resources: Vec<ServerResource> = resources.into_iter().collect();
        for resource in &resources {
            validate_uri(resource.uri())?;
        }
        lock(&self.inner.features).resources.add(resources);
        self.notify_all(methods::NOTIFICATION_RESOURCES_LIST_CHANGED);
        Ok(())
    }

    /// Remove resources by URI, notifying sessions if any were removed.
    pub fn remove_resources<'a>(&self, uris: impl IntoIterator<Item = &'a str>) {
        let removed = lock(&self.inner.features).resources.remove(uris);
        if removed {
            self.notify_all(methods::NOTIFICATION_RESOURCES_LIST_CHANGED);
        }
    }

    /// Add or replace resource templates, then notify every session.
    pub fn add_resource_templates(&self, templates: impl IntoIterator<Item = ServerResourceTemplate>) {
        lock(&self.inner.features).templates.add(templates);
        self.notify_all(methods::NOTIFICATION_RESOURCES_LIST_CHANGED);
    }

    /// Remove resource templates by URI template, notifying sessions if any
    /// were removed.
    pub fn remove_resource_templates<'a>(&self, uri_templates: impl IntoIterator<Item = &'a str>) {
        let removed = lock(&self.inner.features).templates.remove(uri_templates);
        if removed {
            self.notify_all(methods::NOTIFICATION_RESOURCES_LIST_CHANGED);
        }
    }

    /// Names of the registered tools, in order.
    #[must_use]
    pub fn tool_names(&self) -> Vec<String> {
        lock(&self.inner.features)
            .tools
            .all()
            .map(|t| t.name().to_string())
            .collect()
    }

    /// Wrap the handler for incoming traffic. The first middleware listed
    /// runs outermost; later calls wrap earlier ones.
    pub fn add_receiving_middleware(&self, middleware: &[Middleware<ServerSession>]) {
        lock(&self.inner.receiving).add(middleware);
    }

    /// Wrap the handler for outgoing traffic.
    pub fn add_sending_middleware(&self, middleware: &[Middleware<ServerSession>]) {
        lock(&self.inner.sending).add(middleware);
    }

    /// Sessions currently connected.
    #[must_use]
    pub fn sessions(&self) -> Vec<Arc<ServerSession>> {
        lock(&self.inner.sessions).clone()
    }

    /// Serve one client over `transport`.
    ///
    /// The session starts reading immediately and is listed in
    /// [`sessions`](Self::sessions) until its connection closes.
    pub fn connect<T: Transport + 'static>(&self, transport: T) -> Arc<ServerSession> {
        self.connect_dyn(Arc::new(transport))
    }

    /// Serve one client over a type-erased transport.
    pub fn connect_dyn(&self, transport: Arc<dyn DynTransport>) -> Arc<ServerSession> {
        let connection = Connection::from_dyn(transport);
        let session = Arc::new(ServerSession::new(
            Arc::clone(&self.inner),
            Arc::clone(&connection),
        ));

        let weak = Arc::downgrade(&session);
        let inner = Arc::clone(&self.inner);
        connection.start(Arc::new(move |ctx, method, params| {
            let Some(session) = weak.upgrade() else {
                return Box::pin(async { Err(McpError::ConnectionClosed) });
            };
            if let Err(e) = check_initialized(session.state(), &method) {
                debug!(method = %method, "rejecting request before initialization");
                return Box::pin(async move { Err(e) });
            }
            inner.receiving_handler()(ctx, session, method, params)
        }));

        lock(&self.inner.sessions).push(Arc::clone(&session));
        info!(
            transport = %connection.metadata().transport_type,
            session_id = ?session.session_id(),
            "server session connected"
        );

        let inner = Arc::clone(&self.inner);
        let reaped = Arc::clone(&session);
        tokio::spawn(async move {
            reaped.connection().wait().await;
            reaped.mark_closed();
            inner.remove_session(&reaped);
            info!(session_id = ?reaped.session_id(), "server session closed");
        });

        session
    }

    /// Serve one client over `transport` until the connection closes.
    pub async fn run<T: Transport + 'static>(&self, transport: T) -> Result<(), McpError> {
        let session = self.connect(transport);
        session.wait().await;
        Ok(())
    }

    /// Tell every session that a catalog changed.
    ///
    /// Each notification runs on its own task, bounded by
    /// [`LIST_CHANGED_TIMEOUT`].
    fn notify_all(&self, method: &'static str) {
        let sessions = self.sessions();
        if sessions.is_empty() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(method, "no runtime to send list change notifications");
            return;
        };
        for session in sessions {
            runtime.spawn(async move {
                let params = ListChangedParams::default();
                let notify = send_notification(&session, method, &params);
                match tokio::time::timeout(LIST_CHANGED_TIMEOUT, notify).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => debug!(method, error = %e, "list change notification failed"),
                    Err(_) => warn!(method, session_id = ?session.session_id(), "list change notification timed out"),
                }
            });
        }
    }
}

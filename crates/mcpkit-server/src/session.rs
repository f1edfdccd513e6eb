//! The server side of one client connection.

use std::sync::{Arc, Mutex};

use mcpkit_core::capability::{InitializeParams, InitializeResult, InitializedParams};
use mcpkit_core::error::McpError;
use mcpkit_core::methods;
use mcpkit_core::types::{
    CreateMessageParams, CreateMessageResult, ListRootsParams, ListRootsResult, LoggingLevel,
    LoggingMessageParams, ProgressParams,
};
use mcpkit_session::{
    Connection, Context, MethodHandler, Session, SessionState, StateCell, send_notification,
    send_request, spawn_keepalive,
};
use tracing::{debug, trace};

use crate::server::{ServerInner, lock};

/// One connected client, as seen by the server.
pub struct ServerSession {
    server: Arc<ServerInner>,
    connection: Arc<Connection>,
    state: StateCell,
    log_level: Mutex<Option<LoggingLevel>>,
    client: Mutex<Option<InitializeParams>>,
}

impl std::fmt::Debug for ServerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerSession")
            .field("state", &self.state.get())
            .field("log_level", &self.log_level())
            .field("connection", &self.connection)
            .finish_non_exhaustive()
    }
}

impl Session for ServerSession {
    fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    fn sending_handler(&self) -> MethodHandler<Self> {
        self.server.sending_handler()
    }
}

impl ServerSession {
    pub(crate) fn new(server: Arc<ServerInner>, connection: Arc<Connection>) -> Self {
        Self {
            server,
            connection,
            state: StateCell::default(),
            log_level: Mutex::new(None),
            client: Mutex::new(None),
        }
    }

    pub(crate) fn server(&self) -> &ServerInner {
        &self.server
    }

    /// The HTTP session id, for sessions served over HTTP.
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.connection.metadata().session_id
    }

    /// Where the session is in its lifecycle.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    /// The params the client sent in `initialize`, once it has.
    #[must_use]
    pub fn client_info(&self) -> Option<InitializeParams> {
        lock(&self.client).clone()
    }

    /// The minimum level the client asked for, if it has set one.
    #[must_use]
    pub fn log_level(&self) -> Option<LoggingLevel> {
        *lock(&self.log_level)
    }

    /// Ping the client.
    pub async fn ping(self: &Arc<Self>, ctx: &Context) -> Result<(), McpError> {
        let _: serde_json::Value =
            send_request(self, ctx, methods::PING, &serde_json::json!({})).await?;
        Ok(())
    }

    /// Ask the client for its roots.
    pub async fn list_roots(self: &Arc<Self>, ctx: &Context) -> Result<ListRootsResult, McpError> {
        send_request(self, ctx, methods::ROOTS_LIST, &ListRootsParams::default()).await
    }

    /// Ask the client to sample from its model.
    ///
    /// Fails with the unsupported-method error if the client has no
    /// sampling handler.
    pub async fn create_message(
        self: &Arc<Self>,
        ctx: &Context,
        params: &CreateMessageParams,
    ) -> Result<CreateMessageResult, McpError> {
        send_request(self, ctx, methods::SAMPLING_CREATE_MESSAGE, params).await
    }

    /// Send a log message, if the client asked for this level.
    ///
    /// Nothing is sent before the client calls `logging/setLevel`.
    pub async fn log(self: &Arc<Self>, params: LoggingMessageParams) -> Result<(), McpError> {
        let Some(min) = self.log_level() else {
            trace!(level = %params.level, "no log level set, dropping message");
            return Ok(());
        };
        if params.level < min {
            return Ok(());
        }
        send_notification(self, methods::NOTIFICATION_MESSAGE, &params).await
    }

    /// Report progress on a request the client tagged with a progress token.
    pub async fn notify_progress(self: &Arc<Self>, params: ProgressParams) -> Result<(), McpError> {
        send_notification(self, methods::NOTIFICATION_PROGRESS, &params).await
    }

    /// Close the connection.
    pub async fn close(&self) -> Result<(), McpError> {
        self.connection.close().await
    }

    /// Completes once the connection has closed.
    pub async fn wait(&self) {
        self.connection.wait().await;
    }

    pub(crate) fn initialize(&self, params: InitializeParams) -> InitializeResult {
        debug!(
            client = %params.client_info.name,
            version = %params.client_info.version,
            protocol = %params.protocol_version,
            "initialize"
        );
        *lock(&self.client) = Some(params);
        self.state.advance(SessionState::Initializing);

        let mut result = InitializeResult::new(self.server.info.clone(), ServerInner::capabilities());
        result.instructions.clone_from(&self.server.options.instructions);
        result
    }

    pub(crate) fn initialized(self: &Arc<Self>, params: InitializedParams) {
        let previous = self.state.advance(SessionState::Active);
        if previous >= SessionState::Active {
            return;
        }
        if let Some(interval) = self.server.options.keep_alive {
            spawn_keepalive(Arc::downgrade(self), interval);
        }
        if let Some(callback) = &self.server.options.on_initialized {
            callback(Arc::clone(self), params);
        }
    }

    pub(crate) fn set_log_level(&self, level: LoggingLevel) {
        debug!(%level, "client set log level");
        *lock(&self.log_level) = Some(level);
    }

    pub(crate) fn mark_closed(&self) {
        self.state.advance(SessionState::Closed);
    }
}

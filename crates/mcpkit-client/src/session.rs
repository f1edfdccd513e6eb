//! The client side of one server connection.

use std::future::Future;
use std::sync::{Arc, Mutex};

use futures::StreamExt;
use futures::stream::{self, BoxStream};
use mcpkit_core::capability::{
    EmptyResult, Implementation, InitializeParams, InitializeResult, InitializedParams,
    PROTOCOL_VERSION,
};
use mcpkit_core::error::{McpError, McpResultExt};
use mcpkit_core::methods;
use mcpkit_core::types::{
    CallToolParams, CallToolResult, GetPromptParams, GetPromptResult, ListPromptsParams,
    ListPromptsResult, ListResourceTemplatesParams, ListResourceTemplatesResult,
    ListResourcesParams, ListResourcesResult, ListToolsParams, ListToolsResult, LoggingLevel,
    ProgressParams, Prompt, ReadResourceParams, ReadResourceResult, Resource, ResourceTemplate,
    SetLevelParams, Tool,
};
use mcpkit_session::{
    Connection, Context, MethodHandler, Session, SessionState, StateCell, send_notification,
    send_request, spawn_keepalive,
};
use tracing::{debug, info, warn};

use crate::client::{ClientInner, lock};

/// One connected server, as seen by the client.
pub struct ClientSession {
    client: Arc<ClientInner>,
    connection: Arc<Connection>,
    state: StateCell,
    initialized: Mutex<Option<InitializeResult>>,
}

impl std::fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSession")
            .field("state", &self.state.get())
            .field("connection", &self.connection)
            .finish_non_exhaustive()
    }
}

impl Session for ClientSession {
    fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    fn sending_handler(&self) -> MethodHandler<Self> {
        self.client.sending_handler()
    }
}

impl ClientSession {
    pub(crate) fn new(client: Arc<ClientInner>, connection: Arc<Connection>) -> Self {
        Self {
            client,
            connection,
            state: StateCell::default(),
            initialized: Mutex::new(None),
        }
    }

    pub(crate) fn client(&self) -> &ClientInner {
        &self.client
    }

    /// Where the session is in its lifecycle.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    /// The HTTP session id, for streamable HTTP connections.
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.connection.metadata().session_id
    }

    /// What the server answered to `initialize`.
    #[must_use]
    pub fn initialize_result(&self) -> Option<InitializeResult> {
        lock(&self.initialized).clone()
    }

    /// The server's name and version.
    #[must_use]
    pub fn server_info(&self) -> Option<Implementation> {
        lock(&self.initialized)
            .as_ref()
            .map(|result| result.server_info.clone())
    }

    /// Run the `initialize` / `notifications/initialized` exchange.
    pub(crate) async fn handshake(self: &Arc<Self>, ctx: &Context) -> Result<(), McpError> {
        let params = InitializeParams::new(self.client.info.clone(), self.client.options.capabilities());
        let result: InitializeResult = send_request(self, ctx, methods::INITIALIZE, &params)
            .await
            .context("initialize handshake")?;
        if result.protocol_version != PROTOCOL_VERSION {
            warn!(
                server = %result.protocol_version,
                client = PROTOCOL_VERSION,
                "server answered with a different protocol version"
            );
        }
        info!(
            server = %result.server_info.name,
            version = %result.server_info.version,
            "connected to server"
        );
        *lock(&self.initialized) = Some(result);
        self.state.advance(SessionState::Initializing);

        let initialized = InitializedParams::default();
        send_notification(self, methods::NOTIFICATION_INITIALIZED, &initialized)
            .await
            .context("initialize handshake")?;
        self.state.advance(SessionState::Active);

        if let Some(interval) = self.client.options.keep_alive {
            spawn_keepalive(Arc::downgrade(self), interval);
        }
        Ok(())
    }

    /// Ping the server.
    pub async fn ping(self: &Arc<Self>, ctx: &Context) -> Result<(), McpError> {
        let _: EmptyResult = send_request(self, ctx, methods::PING, &serde_json::json!({})).await?;
        Ok(())
    }

    /// One page of tools.
    pub async fn list_tools(
        self: &Arc<Self>,
        ctx: &Context,
        params: &ListToolsParams,
    ) -> Result<ListToolsResult, McpError> {
        send_request(self, ctx, methods::TOOLS_LIST, params).await
    }

    /// Call a tool.
    ///
    /// A tool that fails returns `Ok` with `is_error` set; `Err` means the
    /// call itself failed, for example because the tool does not exist.
    pub async fn call_tool(
        self: &Arc<Self>,
        ctx: &Context,
        params: &CallToolParams,
    ) -> Result<CallToolResult, McpError> {
        debug!(tool = %params.name, "calling tool");
        send_request(self, ctx, methods::TOOLS_CALL, params).await
    }

    /// One page of prompts.
    pub async fn list_prompts(
        self: &Arc<Self>,
        ctx: &Context,
        params: &ListPromptsParams,
    ) -> Result<ListPromptsResult, McpError> {
        send_request(self, ctx, methods::PROMPTS_LIST, params).await
    }

    /// Render a prompt.
    pub async fn get_prompt(
        self: &Arc<Self>,
        ctx: &Context,
        params: &GetPromptParams,
    ) -> Result<GetPromptResult, McpError> {
        send_request(self, ctx, methods::PROMPTS_GET, params).await
    }

    /// One page of resources.
    pub async fn list_resources(
        self: &Arc<Self>,
        ctx: &Context,
        params: &ListResourcesParams,
    ) -> Result<ListResourcesResult, McpError> {
        send_request(self, ctx, methods::RESOURCES_LIST, params).await
    }

    /// One page of resource templates.
    pub async fn list_resource_templates(
        self: &Arc<Self>,
        ctx: &Context,
        params: &ListResourceTemplatesParams,
    ) -> Result<ListResourceTemplatesResult, McpError> {
        send_request(self, ctx, methods::RESOURCES_TEMPLATES_LIST, params).await
    }

    /// Read a resource.
    pub async fn read_resource(
        self: &Arc<Self>,
        ctx: &Context,
        params: &ReadResourceParams,
    ) -> Result<ReadResourceResult, McpError> {
        send_request(self, ctx, methods::RESOURCES_READ, params).await
    }

    /// Set the minimum level of log messages the server sends.
    pub async fn set_level(self: &Arc<Self>, ctx: &Context, level: LoggingLevel) -> Result<(), McpError> {
        let _: EmptyResult =
            send_request(self, ctx, methods::LOGGING_SET_LEVEL, &SetLevelParams::new(level)).await?;
        Ok(())
    }

    /// Report progress on a request the server tagged with a progress token.
    pub async fn notify_progress(self: &Arc<Self>, params: ProgressParams) -> Result<(), McpError> {
        send_notification(self, methods::NOTIFICATION_PROGRESS, &params).await
    }

    /// Every tool, fetching further pages as the stream is polled.
    pub fn tools(self: &Arc<Self>, ctx: Context) -> BoxStream<'static, Result<Tool, McpError>> {
        let session = Arc::clone(self);
        paginate(move |cursor| {
            let session = Arc::clone(&session);
            let ctx = ctx.clone();
            async move {
                let params = ListToolsParams {
                    cursor,
                    ..ListToolsParams::default()
                };
                let page = session.list_tools(&ctx, &params).await?;
                Ok((page.tools, page.next_cursor))
            }
        })
    }

    /// Every prompt, fetching further pages as the stream is polled.
    pub fn prompts(self: &Arc<Self>, ctx: Context) -> BoxStream<'static, Result<Prompt, McpError>> {
        let session = Arc::clone(self);
        paginate(move |cursor| {
            let session = Arc::clone(&session);
            let ctx = ctx.clone();
            async move {
                let params = ListPromptsParams {
                    cursor,
                    ..ListPromptsParams::default()
                };
                let page = session.list_prompts(&ctx, &params).await?;
                Ok((page.prompts, page.next_cursor))
            }
        })
    }

    /// Every resource, fetching further pages as the stream is polled.
    pub fn resources(self: &Arc<Self>, ctx: Context) -> BoxStream<'static, Result<Resource, McpError>> {
        let session = Arc::clone(self);
        paginate(move |cursor| {
            let session = Arc::clone(&session);
            let ctx = ctx.clone();
            async move {
                let params = ListResourcesParams {
                    cursor,
                    ..ListResourcesParams::default()
                };
                let page = session.list_resources(&ctx, &params).await?;
                Ok((page.resources, page.next_cursor))
            }
        })
    }

    /// Every resource template, fetching further pages as the stream is
    /// polled.
    pub fn resource_templates(
        self: &Arc<Self>,
        ctx: Context,
    ) -> BoxStream<'static, Result<ResourceTemplate, McpError>> {
        let session = Arc::clone(self);
        paginate(move |cursor| {
            let session = Arc::clone(&session);
            let ctx = ctx.clone();
            async move {
                let params = ListResourceTemplatesParams {
                    cursor,
                    ..ListResourceTemplatesParams::default()
                };
                let page = session.list_resource_templates(&ctx, &params).await?;
                Ok((page.resource_templates, page.next_cursor))
            }
        })
    }

    /// Close the connection.
    pub async fn close(&self) -> Result<(), McpError> {
        self.connection.close().await
    }

    /// Completes once the connection has closed.
    pub async fn wait(&self) {
        self.connection.wait().await;
    }

    pub(crate) fn mark_closed(&self) {
        self.state.advance(SessionState::Closed);
    }
}

/// Flatten a paged list call into a stream of items.
///
/// `fetch` is called with the cursor of the page to load (`None` for the
/// first) and returns the items and the next cursor. The stream ends after
/// the page without a cursor, or after the first error.
fn paginate<T, F, Fut>(fetch: F) -> BoxStream<'static, Result<T, McpError>>
where
    T: Send + 'static,
    F: Fn(Option<String>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(Vec<T>, Option<String>), McpError>> + Send + 'static,
{
    stream::unfold((fetch, Some(None)), |(fetch, next)| async move {
        let cursor: Option<String> = next?;
        match fetch(cursor).await {
            Ok((items, next_cursor)) => {
                let next = next_cursor.filter(|c| !c.is_empty()).map(Some);
                Some((Ok(items), (fetch, next)))
            }
            Err(e) => Some((Err(e), (fetch, None))),
        }
    })
    .flat_map(|page| {
        let items: Vec<Result<T, McpError>> = match page {
            Ok(items) => items.into_iter().map(Ok).collect(),
            Err(e) => vec![Err(e)],
        };
        stream::iter(items)
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_paginate_follows_cursors() {
        let pages = Arc::new(vec![
            (vec![1, 2], Some("a".to_string())),
            (vec![3, 4], Some("b".to_string())),
            (vec![5], None),
        ]);
        let items: Vec<i32> = paginate(move |cursor| {
            let pages = Arc::clone(&pages);
            async move {
                let index = match cursor.as_deref() {
                    None => 0,
                    Some("a") => 1,
                    Some("b") => 2,
                    Some(other) => return Err(McpError::internal(format!("bad cursor {other}"))),
                };
                Ok(pages[index].clone())
            }
        })
        .try_collect()
        .await
        .unwrap();
        assert_eq!(items, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_paginate_stops_after_error() {
        let results: Vec<Result<i32, McpError>> = paginate(|cursor| async move {
            match cursor {
                None => Ok((vec![1], Some("next".to_string()))),
                Some(_) => Err(McpError::internal("boom")),
            }
        })
        .collect()
        .await;
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
    }

    #[tokio::test]
    async fn test_paginate_treats_empty_cursor_as_end() {
        let items: Vec<i32> = paginate(|cursor| async move {
            assert!(cursor.is_none());
            Ok((vec![7], Some(String::new())))
        })
        .try_collect()
        .await
        .unwrap();
        assert_eq!(items, vec![7]);
    }
}

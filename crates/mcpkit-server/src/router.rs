//! Dispatch of client requests and notifications.

use std::sync::Arc;

use mcpkit_core::capability::{EmptyResult, InitializeParams, InitializeResult, InitializedParams, PingParams};
use mcpkit_core::error::McpError;
use mcpkit_core::methods;
use mcpkit_core::types::{
    CallToolParams, CallToolResult, GetPromptParams, GetPromptResult, ListChangedParams,
    ListPromptsParams, ListPromptsResult, ListResourceTemplatesParams, ListResourceTemplatesResult,
    ListResourcesParams, ListResourcesResult, ListToolsParams, ListToolsResult, ProgressParams,
    ReadResourceParams, ReadResourceResult, SetLevelParams,
};
use mcpkit_session::{Context, MethodInfo, MethodTable};
use tracing::debug;

use crate::capability::resources::fill_contents;
use crate::capability::{PromptHandler, ResourceHandler, ToolHandler};
use crate::server::lock;
use crate::session::ServerSession;

/// Methods a server may send to its client.
pub(crate) const SERVER_SENDS: &[&str] = &[
    methods::PING,
    methods::ROOTS_LIST,
    methods::SAMPLING_CREATE_MESSAGE,
    methods::NOTIFICATION_MESSAGE,
    methods::NOTIFICATION_PROGRESS,
    methods::NOTIFICATION_TOOLS_LIST_CHANGED,
    methods::NOTIFICATION_PROMPTS_LIST_CHANGED,
    methods::NOTIFICATION_RESOURCES_LIST_CHANGED,
];

/// Every method a server answers.
pub(crate) fn receiving_table() -> MethodTable<ServerSession> {
    MethodTable::new()
        .with(
            methods::INITIALIZE,
            MethodInfo::request(|_ctx, session: Arc<ServerSession>, params: InitializeParams| async move {
                Ok::<InitializeResult, McpError>(session.initialize(params))
            }),
        )
        .with(
            methods::PING,
            MethodInfo::request(|_ctx, _session: Arc<ServerSession>, _params: PingParams| async {
                Ok::<_, McpError>(EmptyResult::default())
            }),
        )
        .with(methods::TOOLS_LIST, MethodInfo::request(list_tools))
        .with(methods::TOOLS_CALL, MethodInfo::request(call_tool))
        .with(methods::PROMPTS_LIST, MethodInfo::request(list_prompts))
        .with(methods::PROMPTS_GET, MethodInfo::request(get_prompt))
        .with(methods::RESOURCES_LIST, MethodInfo::request(list_resources))
        .with(
            methods::RESOURCES_TEMPLATES_LIST,
            MethodInfo::request(list_resource_templates),
        )
        .with(methods::RESOURCES_READ, MethodInfo::request(read_resource))
        .with(
            methods::LOGGING_SET_LEVEL,
            MethodInfo::request(|_ctx, session: Arc<ServerSession>, params: SetLevelParams| async move {
                session.set_log_level(params.level);
                Ok::<_, McpError>(EmptyResult::default())
            }),
        )
        .with(
            methods::NOTIFICATION_INITIALIZED,
            MethodInfo::notification(|_ctx, session: Arc<ServerSession>, params: InitializedParams| {
                session.initialized(params);
                async { Ok::<(), McpError>(()) }
            }),
        )
        .with(
            methods::NOTIFICATION_ROOTS_LIST_CHANGED,
            MethodInfo::notification(|_ctx, session: Arc<ServerSession>, params: ListChangedParams| {
                if let Some(callback) = session.server().options.on_roots_list_changed.clone() {
                    callback(session, params);
                }
                async { Ok::<(), McpError>(()) }
            }),
        )
        .with(
            methods::NOTIFICATION_PROGRESS,
            MethodInfo::notification(|_ctx, session: Arc<ServerSession>, params: ProgressParams| {
                if let Some(callback) = session.server().options.on_progress.clone() {
                    callback(session, params);
                }
                async { Ok::<(), McpError>(()) }
            }),
        )
}

async fn list_tools(
    _ctx: Context,
    session: Arc<ServerSession>,
    params: ListToolsParams,
) -> Result<ListToolsResult, McpError> {
    let server = session.server();
    let features = lock(&server.features);
    let (page, next_cursor) = features.tools.page(
        methods::TOOLS_LIST,
        params.cursor.as_deref(),
        server.options.page_size,
    )?;
    Ok(ListToolsResult {
        tools: page.into_iter().map(|t| t.tool.clone()).collect(),
        next_cursor,
        ..ListToolsResult::default()
    })
}

async fn call_tool(
    ctx: Context,
    session: Arc<ServerSession>,
    params: CallToolParams,
) -> Result<CallToolResult, McpError> {
    let handler: Option<ToolHandler> = lock(&session.server().features)
        .tools
        .get(&params.name)
        .map(|t| Arc::clone(&t.handler));
    let Some(handler) = handler else {
        return Err(McpError::invalid_params(
            methods::TOOLS_CALL,
            format!("unknown tool {:?}", params.name),
        ));
    };
    debug!(tool = %params.name, "calling tool");
    handler(ctx, session, params).await
}

async fn list_prompts(
    _ctx: Context,
    session: Arc<ServerSession>,
    params: ListPromptsParams,
) -> Result<ListPromptsResult, McpError> {
    let server = session.server();
    let features = lock(&server.features);
    let (page, next_cursor) = features.prompts.page(
        methods::PROMPTS_LIST,
        params.cursor.as_deref(),
        server.options.page_size,
    )?;
    Ok(ListPromptsResult {
        prompts: page.into_iter().map(|p| p.prompt.clone()).collect(),
        next_cursor,
        ..ListPromptsResult::default()
    })
}

async fn get_prompt(
    ctx: Context,
    session: Arc<ServerSession>,
    params: GetPromptParams,
) -> Result<GetPromptResult, McpError> {
    let handler: Option<PromptHandler> = lock(&session.server().features)
        .prompts
        .get(&params.name)
        .map(|p| Arc::clone(&p.handler));
    let Some(handler) = handler else {
        return Err(McpError::invalid_params(
            methods::PROMPTS_GET,
            format!("unknown prompt {:?}", params.name),
        ));
    };
    handler(ctx, session, params).await
}

async fn list_resources(
    _ctx: Context,
    session: Arc<ServerSession>,
    params: ListResourcesParams,
) -> Result<ListResourcesResult, McpError> {
    let server = session.server();
    let features = lock(&server.features);
    let (page, next_cursor) = features.resources.page(
        methods::RESOURCES_LIST,
        params.cursor.as_deref(),
        server.options.page_size,
    )?;
    Ok(ListResourcesResult {
        resources: page.into_iter().map(|r| r.resource.clone()).collect(),
        next_cursor,
        ..ListResourcesResult::default()
    })
}

async fn list_resource_templates(
    _ctx: Context,
    session: Arc<ServerSession>,
    params: ListResourceTemplatesParams,
) -> Result<ListResourceTemplatesResult, McpError> {
    let server = session.server();
    let features = lock(&server.features);
    let (page, next_cursor) = features.templates.page(
        methods::RESOURCES_TEMPLATES_LIST,
        params.cursor.as_deref(),
        server.options.page_size,
    )?;
    Ok(ListResourceTemplatesResult {
        resource_templates: page.into_iter().map(|t| t.template.clone()).collect(),
        next_cursor,
        ..ListResourceTemplatesResult::default()
    })
}

/// Find the handler for `uri`: an exact resource first, then the first
/// matching template.
fn resource_target(session: &ServerSession, uri: &str) -> Option<(ResourceHandler, Option<String>)> {
    let features = lock(&session.server().features);
    if let Some(resource) = features.resources.get(uri) {
        return Some((Arc::clone(&resource.handler), resource.resource.mime_type.clone()));
    }
    features
        .templates
        .all()
        .find(|t| t.matches(uri))
        .map(|t| (Arc::clone(&t.handler), t.template.mime_type.clone()))
}

async fn read_resource(
    ctx: Context,
    session: Arc<ServerSession>,
    params: ReadResourceParams,
) -> Result<ReadResourceResult, McpError> {
    let Some((handler, mime_type)) = resource_target(&session, &params.uri) else {
        return Err(McpError::resource_not_found(&params.uri));
    };
    let uri = params.uri.clone();
    let mut result = handler(ctx, session, params).await?;
    fill_contents(&mut result.contents, &uri, mime_type.as_deref());
    Ok(result)
}

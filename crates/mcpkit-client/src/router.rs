//! Dispatch of server requests and notifications.

use std::sync::Arc;

use mcpkit_core::capability::{EmptyResult, PingParams};
use mcpkit_core::error::McpError;
use mcpkit_core::methods;
use mcpkit_core::types::{
    CreateMessageParams, CreateMessageResult, ListChangedParams, ListRootsParams, ListRootsResult,
    LoggingMessageParams, ProgressParams,
};
use mcpkit_session::{Context, MethodInfo, MethodTable};

use crate::builder::ClientOptions;
use crate::client::lock;
use crate::handler::NotificationCallback;
use crate::session::ClientSession;

/// Methods a client may send to its server.
pub(crate) const CLIENT_SENDS: &[&str] = &[
    methods::INITIALIZE,
    methods::PING,
    methods::TOOLS_LIST,
    methods::TOOLS_CALL,
    methods::PROMPTS_LIST,
    methods::PROMPTS_GET,
    methods::RESOURCES_LIST,
    methods::RESOURCES_TEMPLATES_LIST,
    methods::RESOURCES_READ,
    methods::LOGGING_SET_LEVEL,
    methods::NOTIFICATION_INITIALIZED,
    methods::NOTIFICATION_PROGRESS,
    methods::NOTIFICATION_ROOTS_LIST_CHANGED,
];

/// Every method a client answers.
pub(crate) fn receiving_table() -> MethodTable<ClientSession> {
    MethodTable::new()
        .with(
            methods::PING,
            MethodInfo::request(|_ctx, _session: Arc<ClientSession>, _params: PingParams| async {
                Ok::<_, McpError>(EmptyResult::default())
            }),
        )
        .with(methods::ROOTS_LIST, MethodInfo::request(list_roots))
        .with(methods::SAMPLING_CREATE_MESSAGE, MethodInfo::request(create_message))
        .with(
            methods::NOTIFICATION_TOOLS_LIST_CHANGED,
            callback::<ListChangedParams>(|options| options.on_tools_list_changed.clone()),
        )
        .with(
            methods::NOTIFICATION_PROMPTS_LIST_CHANGED,
            callback::<ListChangedParams>(|options| options.on_prompts_list_changed.clone()),
        )
        .with(
            methods::NOTIFICATION_RESOURCES_LIST_CHANGED,
            callback::<ListChangedParams>(|options| options.on_resources_list_changed.clone()),
        )
        .with(
            methods::NOTIFICATION_MESSAGE,
            callback::<LoggingMessageParams>(|options| options.on_logging_message.clone()),
        )
        .with(
            methods::NOTIFICATION_PROGRESS,
            callback::<ProgressParams>(|options| options.on_progress.clone()),
        )
}

/// A notification handler that runs the callback `pick` selects, if set.
fn callback<P>(pick: fn(&ClientOptions) -> Option<NotificationCallback<P>>) -> MethodInfo<ClientSession>
where
    P: serde::de::DeserializeOwned + Send + 'static,
{
    MethodInfo::notification(move |_ctx, session: Arc<ClientSession>, params: P| {
        if let Some(callback) = pick(&session.client().options) {
            callback(session, params);
        }
        async { Ok::<(), McpError>(()) }
    })
}

async fn list_roots(
    _ctx: Context,
    session: Arc<ClientSession>,
    _params: ListRootsParams,
) -> Result<ListRootsResult, McpError> {
    let roots = lock(&session.client().roots).all().cloned().collect();
    Ok(ListRootsResult {
        roots,
        ..ListRootsResult::default()
    })
}

async fn create_message(
    ctx: Context,
    session: Arc<ClientSession>,
    params: CreateMessageParams,
) -> Result<CreateMessageResult, McpError> {
    let Some(handler) = session.client().options.sampling.clone() else {
        return Err(McpError::unsupported_method(methods::SAMPLING_CREATE_MESSAGE));
    };
    handler(ctx, session, params).await
}

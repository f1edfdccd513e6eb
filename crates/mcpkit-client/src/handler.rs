//! Handlers for server-initiated traffic.
//!
//! A server can ask its client to sample from a model
//! (`sampling/createMessage`) and can send notifications about changed
//! catalogs, log messages and progress. The client answers `roots/list`
//! itself from its root set.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use mcpkit_core::error::McpError;
use mcpkit_core::types::{CreateMessageParams, CreateMessageResult};
use mcpkit_session::Context;

use crate::session::ClientSession;

/// Answers `sampling/createMessage` requests.
///
/// # Example
///
/// ```rust
/// use mcpkit_client::sampling_handler;
/// use mcpkit_core::types::CreateMessageResult;
///
/// let handler = sampling_handler(|_ctx, _session, params| async move {
///     let prompt = params.messages.len();
///     Ok(CreateMessageResult::text("echo-model", format!("saw {prompt} messages")))
/// });
/// # let _ = handler;
/// ```
pub type SamplingHandler = Arc<
    dyn Fn(Context, Arc<ClientSession>, CreateMessageParams) -> BoxFuture<'static, Result<CreateMessageResult, McpError>>
        + Send
        + Sync,
>;

/// Box an async function as a [`SamplingHandler`].
pub fn sampling_handler<F, Fut>(handler: F) -> SamplingHandler
where
    F: Fn(Context, Arc<ClientSession>, CreateMessageParams) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<CreateMessageResult, McpError>> + Send + 'static,
{
    Arc::new(move |ctx, session, params| Box::pin(handler(ctx, session, params)))
}

/// A callback run when a server notification arrives.
pub type NotificationCallback<P> = Arc<dyn Fn(Arc<ClientSession>, P) + Send + Sync>;

//! Client options.
//!
//! [`ClientOptions`] collects everything a [`Client`](crate::Client) needs
//! beyond its name and version: the sampling handler, notification
//! callbacks and the keep-alive interval.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use mcpkit_core::capability::ClientCapabilities;
use mcpkit_core::error::McpError;
use mcpkit_core::types::{
    CreateMessageParams, CreateMessageResult, ListChangedParams, LoggingMessageParams,
    ProgressParams,
};
use mcpkit_session::Context;

use crate::handler::{NotificationCallback, SamplingHandler, sampling_handler};
use crate::session::ClientSession;

/// Options shared by every session of a client.
///
/// # Example
///
/// ```rust
/// use mcpkit_client::ClientOptions;
///
/// let options = ClientOptions::new()
///     .on_tools_list_changed(|_session, _params| tracing::info!("tools changed"))
///     .on_logging_message(|_session, msg| tracing::info!(level = %msg.level, "server log"));
/// assert!(!options.capabilities().has_sampling());
/// ```
#[derive(Clone, Default)]
pub struct ClientOptions {
    pub(crate) sampling: Option<SamplingHandler>,
    pub(crate) keep_alive: Option<Duration>,
    pub(crate) on_tools_list_changed: Option<NotificationCallback<ListChangedParams>>,
    pub(crate) on_prompts_list_changed: Option<NotificationCallback<ListChangedParams>>,
    pub(crate) on_resources_list_changed: Option<NotificationCallback<ListChangedParams>>,
    pub(crate) on_logging_message: Option<NotificationCallback<LoggingMessageParams>>,
    pub(crate) on_progress: Option<NotificationCallback<ProgressParams>>,
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("sampling", &self.sampling.is_some())
            .field("keep_alive", &self.keep_alive)
            .field("on_tools_list_changed", &self.on_tools_list_changed.is_some())
            .field("on_prompts_list_changed", &self.on_prompts_list_changed.is_some())
            .field("on_resources_list_changed", &self.on_resources_list_changed.is_some())
            .field("on_logging_message", &self.on_logging_message.is_some())
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

impl ClientOptions {
    /// Default options: no sampling, no callbacks, no keep-alive.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `sampling/createMessage` with `handler`. Also advertises the
    /// sampling capability.
    #[must_use]
    pub fn sampling<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(Context, Arc<ClientSession>, CreateMessageParams) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<CreateMessageResult, McpError>> + Send + 'static,
    {
        self.sampling = Some(sampling_handler(handler));
        self
    }

    /// Install an already boxed sampling handler.
    #[must_use]
    pub fn sampling_handler(mut self, handler: SamplingHandler) -> Self {
        self.sampling = Some(handler);
        self
    }

    /// Ping the server at this interval, closing the session if it does not
    /// answer.
    #[must_use]
    pub fn keep_alive(mut self, interval: Duration) -> Self {
        self.keep_alive = Some(interval);
        self
    }

    /// Called on `notifications/tools/list_changed`.
    #[must_use]
    pub fn on_tools_list_changed<F>(mut self, f: F) -> Self
    where
        F: Fn(Arc<ClientSession>, ListChangedParams) + Send + Sync + 'static,
    {
        self.on_tools_list_changed = Some(Arc::new(f));
        self
    }

    /// Called on `notifications/prompts/list_changed`.
    #[must_use]
    pub fn on_prompts_list_changed<F>(mut self, f: F) -> Self
    where
        F: Fn(Arc<ClientSession>, ListChangedParams) + Send + Sync + 'static,
    {
        self.on_prompts_list_changed = Some(Arc::new(f));
        self
    }

    /// Called on `notifications/resources/list_changed`.
    #[must_use]
    pub fn on_resources_list_changed<F>(mut self, f: F) -> Self
    where
        F: Fn(Arc<ClientSession>, ListChangedParams) + Send + Sync + 'static,
    {
        self.on_resources_list_changed = Some(Arc::new(f));
        self
    }

    /// Called on `notifications/message`.
    #[must_use]
    pub fn on_logging_message<F>(mut self, f: F) -> Self
    where
        F: Fn(Arc<ClientSession>, LoggingMessageParams) + Send + Sync + 'static,
    {
        self.on_logging_message = Some(Arc::new(f));
        self
    }

    /// Called on `notifications/progress`.
    #[must_use]
    pub fn on_progress<F>(mut self, f: F) -> Self
    where
        F: Fn(Arc<ClientSession>, ProgressParams) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(f));
        self
    }

    /// The capabilities these options advertise in `initialize`.
    #[must_use]
    pub fn capabilities(&self) -> ClientCapabilities {
        let capabilities = ClientCapabilities::new().with_roots();
        if self.sampling.is_some() {
            capabilities.with_sampling()
        } else {
            capabilities
        }
    }
}

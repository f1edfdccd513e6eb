//! Server options.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use mcpkit_server::ServerOptions;
//!
//! let options = ServerOptions::new()
//!     .instructions("Use the greet tool")
//!     .page_size(50)
//!     .keep_alive(Duration::from_secs(30))
//!     .on_initialized(|session, _params| {
//!         tracing::info!(session = ?session.session_id(), "client ready");
//!     });
//! assert_eq!(options.get_page_size(), 50);
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use mcpkit_core::DEFAULT_PAGE_SIZE;
use mcpkit_core::capability::InitializedParams;
use mcpkit_core::types::{ListChangedParams, ProgressParams};

use crate::session::ServerSession;

/// A callback run when a client notification arrives.
pub type NotificationCallback<P> = Arc<dyn Fn(Arc<ServerSession>, P) + Send + Sync>;

/// Options shared by every session of a [`Server`](crate::Server).
#[derive(Clone)]
pub struct ServerOptions {
    pub(crate) instructions: Option<String>,
    pub(crate) page_size: usize,
    pub(crate) keep_alive: Option<Duration>,
    pub(crate) on_initialized: Option<NotificationCallback<InitializedParams>>,
    pub(crate) on_roots_list_changed: Option<NotificationCallback<ListChangedParams>>,
    pub(crate) on_progress: Option<NotificationCallback<ProgressParams>>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            instructions: None,
            page_size: DEFAULT_PAGE_SIZE,
            keep_alive: None,
            on_initialized: None,
            on_roots_list_changed: None,
            on_progress: None,
        }
    }
}

impl fmt::Debug for ServerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerOptions")
            .field("instructions", &self.instructions)
            .field("page_size", &self.page_size)
            .field("keep_alive", &self.keep_alive)
            .field("on_initialized", &self.on_initialized.is_some())
            .field("on_roots_list_changed", &self.on_roots_list_changed.is_some())
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

impl ServerOptions {
    /// Default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Instructions returned from `initialize`.
    #[must_use]
    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Maximum number of items per `*/list` page. Zero is treated as one.
    #[must_use]
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Ping every client at this interval once it is initialized, closing
    /// sessions that do not answer.
    #[must_use]
    pub fn keep_alive(mut self, interval: Duration) -> Self {
        self.keep_alive = Some(interval);
        self
    }

    /// Called when a client sends `notifications/initialized`.
    #[must_use]
    pub fn on_initialized<F>(mut self, f: F) -> Self
    where
        F: Fn(Arc<ServerSession>, InitializedParams) + Send + Sync + 'static,
    {
        self.on_initialized = Some(Arc::new(f));
        self
    }

    /// Called when a client sends `notifications/roots/list_changed`.
    #[must_use]
    pub fn on_roots_list_changed<F>(mut self, f: F) -> Self
    where
        F: Fn(Arc<ServerSession>, ListChangedParams) + Send + Sync + 'static,
    {
        self.on_roots_list_changed = Some(Arc::new(f));
        self
    }

    /// Called when a client sends `notifications/progress`.
    #[must_use]
    pub fn on_progress<F>(mut self, f: F) -> Self
    where
        F: Fn(Arc<ServerSession>, ProgressParams) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(f));
        self
    }

    /// The configured page size.
    #[must_use]
    pub fn get_page_size(&self) -> usize {
        self.page_size
    }
}

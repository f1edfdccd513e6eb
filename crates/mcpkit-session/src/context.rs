//! Request context for MCP handlers.
//!
//! Every incoming request is handled with a [`Context`] carrying a
//! cancellation token, the request id and the progress token the peer
//! attached to the params' `_meta`. The token is cancelled when the peer
//! sends `notifications/cancelled` for the request or the session closes.
//!
//! Outgoing calls take a context too: cancelling its token abandons the
//! call and tells the peer.
//!
//! # Example
//!
//! ```rust
//! use mcpkit_session::Context;
//!
//! let ctx = Context::new();
//! assert!(!ctx.is_cancelled());
//!
//! let child = ctx.child();
//! ctx.cancel();
//! assert!(child.is_cancelled());
//! ```

use mcpkit_core::protocol::{ProgressToken, RequestId};
use serde_json::Value;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Request-scoped state passed to every method handler.
#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
    request_id: Option<RequestId>,
    progress_token: Option<ProgressToken>,
}

impl Context {
    /// A fresh, uncancelled context not tied to any request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A context cancelled through `token`.
    #[must_use]
    pub fn with_cancellation(token: CancellationToken) -> Self {
        Self {
            token,
            ..Self::default()
        }
    }

    /// The context an incoming request runs with.
    pub(crate) fn for_request(id: RequestId, token: CancellationToken, params: &Value) -> Self {
        Self {
            token,
            request_id: Some(id),
            progress_token: progress_token_of(params),
        }
    }

    /// A context that is cancelled whenever this one is, for calls made
    /// while handling a request.
    #[must_use]
    pub fn child(&self) -> Self {
        Self::with_cancellation(self.token.child_token())
    }

    /// The id of the request being handled, if any.
    #[must_use]
    pub fn request_id(&self) -> Option<&RequestId> {
        self.request_id.as_ref()
    }

    /// The progress token the peer attached to the request, if any.
    #[must_use]
    pub fn progress_token(&self) -> Option<&ProgressToken> {
        self.progress_token.as_ref()
    }

    /// The underlying cancellation token.
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Cancel this context and every child.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Check if the context has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes when the context is cancelled.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }
}

fn progress_token_of(params: &Value) -> Option<ProgressToken> {
    let token = params.get("_meta")?.get("progressToken")?;
    serde_json::from_value(token.clone()).ok()
}

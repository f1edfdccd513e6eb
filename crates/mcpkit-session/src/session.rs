//! Session plumbing shared by the server and client roles.
//!
//! A [`Session`] is one side of a live connection. Outgoing traffic goes
//! through the session's sending handler (so middleware sees it), and the
//! default sending handler only forwards methods its role is allowed to
//! send; anything else fails with [`McpError::NotHandled`].

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use mcpkit_core::error::McpError;
use mcpkit_core::methods;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::context::Context;
use crate::method::{MethodHandler, decode_params};

/// One side of a live MCP connection.
pub trait Session: Send + Sync + Sized + 'static {
    /// The JSON-RPC connection this session runs on.
    fn connection(&self) -> &Arc<Connection>;

    /// The outgoing handler, including any sending middleware.
    fn sending_handler(&self) -> MethodHandler<Self>;
}

/// The default sending handler for a role that may send `allowed`.
///
/// Notifications are sent without waiting; requests wait for the peer's
/// result.
#[must_use]
pub fn default_sender<S: Session>(allowed: &'static [&'static str]) -> MethodHandler<S> {
    Arc::new(move |ctx, session: Arc<S>, method, params| {
        Box::pin(async move {
            if !allowed.contains(&method.as_str()) {
                return Err(McpError::not_handled(method));
            }
            if methods::is_notification(&method) {
                session.connection().notify(&method, params).await?;
                Ok(Value::Null)
            } else {
                session.connection().call(&ctx, &method, params).await
            }
        })
    })
}

/// Send a typed request through the session's sending handler.
pub async fn send_request<S, P, R>(
    session: &Arc<S>,
    ctx: &Context,
    method: &str,
    params: &P,
) -> Result<R, McpError>
where
    S: Session,
    P: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let params = encode_params(method, params)?;
    let handler = session.sending_handler();
    let result = handler(ctx.clone(), Arc::clone(session), method.to_string(), params).await?;
    decode_params(method, result).map_err(|e| {
        McpError::internal(format!("malformed {method} result from peer: {e}"))
    })
}

/// Send a typed notification through the session's sending handler.
pub async fn send_notification<S, P>(session: &Arc<S>, method: &str, params: &P) -> Result<(), McpError>
where
    S: Session,
    P: Serialize + ?Sized,
{
    let params = encode_params(method, params)?;
    let handler = session.sending_handler();
    handler(Context::new(), Arc::clone(session), method.to_string(), params).await?;
    Ok(())
}

fn encode_params<P: Serialize + ?Sized>(method: &str, params: &P) -> Result<Value, McpError> {
    serde_json::to_value(params)
        .map_err(|e| McpError::internal(format!("failed to encode {method} params: {e}")))
}

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SessionState {
    /// Connected, nothing exchanged yet.
    Pending = 0,
    /// `initialize` has been answered.
    Initializing = 1,
    /// `notifications/initialized` has been seen.
    Active = 2,
    /// The connection is gone.
    Closed = 3,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Pending,
            1 => Self::Initializing,
            2 => Self::Active,
            _ => Self::Closed,
        }
    }
}

/// A shared, lock-free [`SessionState`].
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl Default for StateCell {
    fn default() -> Self {
        Self::new(SessionState::Pending)
    }
}

impl StateCell {
    /// A cell holding `state`.
    #[must_use]
    pub fn new(state: SessionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    /// The current state.
    #[must_use]
    pub fn get(&self) -> SessionState {
        SessionState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move forward to `state`. States never move backwards, so a late
    /// `initialize` cannot reopen a closed session.
    pub fn advance(&self, state: SessionState) -> SessionState {
        let previous = self.0.fetch_max(state as u8, Ordering::AcqRel);
        SessionState::from_u8(previous)
    }
}

/// Reject requests that arrive before the session is active.
///
/// `initialize`, `ping` and all notifications are always let through.
pub fn check_initialized(state: SessionState, method: &str) -> Result<(), McpError> {
    if state == SessionState::Active
        || method == methods::INITIALIZE
        || method == methods::PING
        || methods::is_notification(method)
    {
        return Ok(());
    }
    Err(McpError::invalid_during_initialization(method))
}

/// Ping the peer every `interval`, closing the connection on the first
/// failure. Stops once the session is dropped or its connection closes.
pub fn spawn_keepalive<S: Session>(session: Weak<S>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(session) = session.upgrade() else {
                break;
            };
            if session.connection().is_closed() {
                break;
            }

            let ctx = Context::new();
            let params = serde_json::json!({});
            let ping = send_request::<S, _, Value>(&session, &ctx, methods::PING, &params);
            let outcome = match tokio::time::timeout(interval, ping).await {
                Ok(result) => result.map(|_| ()),
                Err(_) => Err(McpError::timeout(methods::PING, interval)),
            };
            match outcome {
                Ok(()) => debug!("keep-alive ping answered"),
                Err(e) => {
                    warn!(error = %e, "keep-alive ping failed, closing session");
                    if let Err(e) = session.connection().close().await {
                        debug!(error = %e, "error closing connection after failed ping");
                    }
                    break;
                }
            }
        }
    })
}

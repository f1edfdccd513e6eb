//! Session core for mcpkit.
//!
//! This crate holds what the server and client roles share:
//!
//! - [`Connection`]: a JSON-RPC endpoint over any transport, with request
//!   correlation, concurrent dispatch and cancellation in both directions
//! - [`Context`]: per-request cancellation and progress token
//! - [`MethodInfo`] and [`MethodTable`]: typed handlers behind an untyped
//!   dispatch signature
//! - [`Middleware`] and [`HandlerChain`]: handler wrapping for sending and
//!   receiving
//! - [`Session`]: the trait both roles implement, plus typed
//!   [`send_request`] and [`send_notification`]

#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod connection;
pub mod context;
pub mod method;
pub mod middleware;
pub mod session;

pub use connection::{Connection, IncomingHandler};
pub use context::Context;
pub use method::{MethodHandler, MethodInfo, MethodTable};
pub use middleware::{HandlerChain, Middleware};
pub use session::{
    Session, SessionState, StateCell, check_initialized, default_sender, send_notification,
    send_request, spawn_keepalive,
};

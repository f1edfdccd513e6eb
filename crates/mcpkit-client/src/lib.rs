//! Client implementation for the MCP SDK.
//!
//! A [`Client`] connects to MCP servers, runs the `initialize` handshake
//! and hands back a [`ClientSession`] with typed calls for tools, prompts,
//! resources and logging. The client answers the server's `roots/list`
//! from its root set and, when [`ClientOptions::sampling`] is configured,
//! its `sampling/createMessage` requests.
//!
//! # Example
//!
//! ```no_run
//! use futures::TryStreamExt;
//! use mcpkit_client::{Client, ClientOptions};
//! use mcpkit_core::capability::Implementation;
//! use mcpkit_session::Context;
//! use mcpkit_transport::CommandTransport;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), mcpkit_core::error::McpError> {
//!     let client = Client::new(Implementation::new("my-client", "1.0.0"), ClientOptions::default());
//!     let session = client
//!         .connect(CommandTransport::spawn("my-mcp-server", &[] as &[&str])?)
//!         .await?;
//!
//!     let tools: Vec<_> = session.tools(Context::new()).try_collect().await?;
//!     for tool in &tools {
//!         println!("Tool: {}", tool.name);
//!     }
//!     session.close().await
//! }
//! ```

#![deny(missing_docs)]

pub mod builder;
pub mod client;
pub mod handler;
mod router;
pub mod session;

pub use builder::ClientOptions;
pub use client::{Client, ROOTS_CHANGED_TIMEOUT};
pub use handler::{NotificationCallback, SamplingHandler, sampling_handler};
pub use mcpkit_session::{Context, Middleware, SessionState};
pub use session::ClientSession;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::builder::ClientOptions;
    pub use crate::client::Client;
    pub use crate::session::ClientSession;
    pub use mcpkit_session::Context;
}

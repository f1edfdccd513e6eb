//! Server implementation for the MCP SDK.
//!
//! A [`Server`] owns catalogs of tools, prompts, resources and resource
//! templates, and serves them to any number of clients. Each client is a
//! [`ServerSession`]; the session can call back into the client to list
//! roots, request sampling, send log messages and report progress.
//!
//! # Example
//!
//! ```rust,no_run
//! use mcpkit_core::capability::Implementation;
//! use mcpkit_core::types::CallToolResult;
//! use mcpkit_server::{Server, ServerOptions, ServerTool};
//! use mcpkit_transport::StdioTransport;
//! use schemars::JsonSchema;
//! use serde::Deserialize;
//!
//! #[derive(Deserialize, JsonSchema)]
//! struct Greet {
//!     /// Who to greet.
//!     name: String,
//! }
//!
//! # async fn run() -> Result<(), mcpkit_core::error::McpError> {
//! let server = Server::new(Implementation::new("greeter", "1.0.0"), ServerOptions::default());
//! server.add_tools([ServerTool::typed("greet", "Say hi", |_ctx, _session, args: Greet| async move {
//!     Ok::<_, String>(CallToolResult::text(format!("Hi {}", args.name)))
//! })]);
//! server.run(StdioTransport::new()).await
//! # }
//! ```
//!
//! # Lifecycle
//!
//! Until the client has sent `initialize` and `notifications/initialized`,
//! only `initialize`, `ping` and notifications are answered; any other
//! request is rejected with an invalid-request error.
//!
//! # Middleware
//!
//! Incoming and outgoing traffic can be wrapped with
//! [`Middleware`] via [`Server::add_receiving_middleware`] and
//! [`Server::add_sending_middleware`].

#![deny(missing_docs)]

pub mod builder;
pub mod capability;
#[cfg(feature = "http")]
mod http;
mod router;
pub mod server;
pub mod session;

pub use builder::{NotificationCallback, ServerOptions};
pub use capability::{
    PromptHandler, ResourceHandler, ServerPrompt, ServerResource, ServerResourceTemplate,
    ServerTool, ToolHandler, UriTemplate, file_resource_handler, input_schema,
};
pub use mcpkit_session::{Context, MethodHandler, Middleware, SessionState};
pub use server::{LIST_CHANGED_TIMEOUT, Server};
pub use session::ServerSession;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::builder::ServerOptions;
    pub use crate::capability::{
        ServerPrompt, ServerResource, ServerResourceTemplate, ServerTool, file_resource_handler,
    };
    pub use crate::server::Server;
    pub use crate::session::ServerSession;
    pub use mcpkit_session::{Context, Middleware};
}

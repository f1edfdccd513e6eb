//! # mcpkit: Model Context Protocol SDK for Rust
//!
//! Build MCP servers that expose tools, prompts and resources, and MCP
//! clients that call them, over stdio, a subprocess, in-memory pipes,
//! HTTP+SSE or streamable HTTP.
//!
//! ## Quick Start
//!
//! ```no_run
//! use mcpkit::prelude::*;
//! use schemars::JsonSchema;
//! use serde::Deserialize;
//!
//! #[derive(Deserialize, JsonSchema)]
//! struct Add {
//!     a: f64,
//!     b: f64,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), McpError> {
//!     let server = Server::new(Implementation::new("calculator", "1.0.0"), ServerOptions::default());
//!     server.add_tools([ServerTool::typed("add", "Add two numbers", |_ctx, _session, args: Add| async move {
//!         Ok::<_, String>(CallToolResult::text((args.a + args.b).to_string()))
//!     })]);
//!     server.run(StdioTransport::new()).await
//! }
//! ```
//!
//! ## Crate Organization
//!
//! - [`mcpkit_core`]: protocol types, errors, capabilities, pagination
//! - [`mcpkit_transport`]: transports (stdio, subprocess, memory, HTTP)
//! - [`mcpkit_session`]: JSON-RPC connection, contexts, middleware
//! - [`mod@mcpkit_server`]: the server role
//! - [`mcpkit_client`]: the client role

#![deny(missing_docs)]

pub use mcpkit_core::*;

pub use mcpkit_client::{Client, ClientOptions, ClientSession};
pub use mcpkit_server::{Server, ServerOptions, ServerSession};
pub use mcpkit_session::{Context, Middleware, SessionState};
pub use mcpkit_transport::{DynTransport, Transport, TransportMetadata};

pub mod prelude;

/// Server module re-exports
pub mod server {
    //! Server implementation types.
    pub use mcpkit_server::*;
}

/// Client module re-exports
pub mod client {
    //! Client implementation types.
    pub use mcpkit_client::*;
}

/// Session module re-exports
pub mod session {
    //! Connection, context and middleware types shared by both roles.
    pub use mcpkit_session::*;
}

/// Transport module re-exports
pub mod transport {
    //! Transport layer types.
    pub use mcpkit_transport::*;
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_prelude_imports() {
        use crate::prelude::*;
        let _ = std::any::type_name::<McpError>();
        let _ = std::any::type_name::<Server>();
        let _ = std::any::type_name::<Client>();
    }
}

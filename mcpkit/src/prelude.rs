//! Prelude module for convenient imports.
//!
//! ```rust
//! use mcpkit::prelude::*;
//!
//! let info = Implementation::new("my-server", "1.0.0");
//! let server = Server::new(info, ServerOptions::new().page_size(100));
//! assert!(server.capabilities().has_tools());
//! ```

pub use mcpkit_core::capability::{
    ClientCapabilities, Implementation, InitializeResult, PROTOCOL_VERSION, ServerCapabilities,
};
pub use mcpkit_core::error::McpError;
pub use mcpkit_core::types::{
    CallToolParams, CallToolResult, Content, CreateMessageParams, CreateMessageResult,
    GetPromptParams, GetPromptResult, LoggingLevel, LoggingMessageParams, ProgressParams, Prompt,
    PromptArgument, PromptMessage, ReadResourceParams, ReadResourceResult, Resource,
    ResourceContents, ResourceTemplate, Root, Tool,
};

pub use mcpkit_client::{Client, ClientOptions, ClientSession};
pub use mcpkit_server::{
    Server, ServerOptions, ServerPrompt, ServerResource, ServerResourceTemplate, ServerSession,
    ServerTool, file_resource_handler,
};
pub use mcpkit_session::{Context, Middleware};
pub use mcpkit_transport::memory;
pub use mcpkit_transport::{CommandTransport, StdioTransport, Transport};

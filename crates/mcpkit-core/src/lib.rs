//! # mcpkit-core
//!
//! Core types for the Model Context Protocol (MCP) SDK.
//!
//! This crate provides the building blocks shared by the transport, session,
//! server and client crates:
//!
//! - **Protocol types**: JSON-RPC 2.0 request/response/notification envelopes
//! - **MCP types**: params and results for tools, resources, prompts, roots,
//!   sampling and logging, each carrying a round-tripping `_meta`
//! - **Capabilities**: the `initialize` handshake types
//! - **Error handling**: the unified [`McpError`] type and JSON-RPC codes
//! - **Pagination**: [`FeatureSet`] and the opaque cursor codec
//!
//! This crate is runtime-agnostic and does not depend on any async runtime.
//!
//! # Protocol Version
//!
//! This crate implements MCP protocol version **2024-11-05**.
//!
//! # Example
//!
//! ```rust
//! use mcpkit_core::{
//!     capability::{Implementation, InitializeResult, ServerCapabilities},
//!     types::Tool,
//! };
//!
//! let tool = Tool::new("search")
//!     .description("Search the database")
//!     .input_schema(serde_json::json!({
//!         "type": "object",
//!         "properties": { "query": { "type": "string" } },
//!         "required": ["query"]
//!     }));
//!
//! let result = InitializeResult::new(
//!     Implementation::new("my-server", "1.0.0"),
//!     ServerCapabilities::new().with_tools(),
//! );
//! assert_eq!(result.protocol_version, "2024-11-05");
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]

pub mod capability;
pub mod cursor;
pub mod error;
pub mod feature_set;
pub mod id;
pub mod meta;
pub mod methods;
pub mod protocol;
pub mod types;

pub use capability::{
    ClientCapabilities, Implementation, InitializeParams, InitializeResult, PROTOCOL_VERSION,
    ServerCapabilities,
};
pub use error::{JsonRpcError, McpError, McpResultExt};
pub use feature_set::{DEFAULT_PAGE_SIZE, FeatureSet};
pub use meta::Meta;
pub use protocol::{Message, Notification, ProgressToken, Request, RequestId, Response};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::capability::{
        ClientCapabilities, Implementation, InitializeParams, InitializeResult, PROTOCOL_VERSION,
        ServerCapabilities,
    };
    pub use crate::error::{McpError, McpResultExt};
    pub use crate::meta::Meta;
    pub use crate::protocol::{Message, Notification, ProgressToken, Request, RequestId, Response};
    pub use crate::types::{
        CallToolParams, CallToolResult, Content, CreateMessageParams, CreateMessageResult,
        GetPromptParams, GetPromptResult, LoggingLevel, Prompt, PromptArgument, PromptMessage,
        ReadResourceParams, ReadResourceResult, Resource, ResourceContents, ResourceTemplate,
        Role, Root, SamplingMessage, Tool,
    };
}

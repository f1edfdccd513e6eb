//! Unified error handling for the MCP SDK.
//!
//! All errors flow through [`McpError`]. It converts to a JSON-RPC error
//! object with [`JsonRpcError::from`] when a handler fails, and back with
//! [`McpError::from_rpc`] when a call receives an error response, so callers
//! can match on [`McpError::code`] in both directions.
//!
//! # Error Handling Patterns
//!
//! ## `Result<T, McpError>` - protocol and SDK errors
//!
//! Use `Result<T, McpError>` for failures that mean the request cannot be
//! completed: transport failures, malformed requests, an unknown prompt or a
//! missing resource.
//!
//! ## `CallToolResult::error` - tool execution failures
//!
//! Tools never fail at the protocol level because their handler failed. The
//! failure is embedded in the result with `isError: true` so the model can
//! see it and try again.
//!
//! ## Reserved codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | [`RESOURCE_NOT_FOUND`] (-31002) | the requested resource does not exist |
//! | [`UNSUPPORTED_METHOD`] (-31001) | the peer lacks the capability for a known method |
//!
//! ## Context Chaining
//!
//! ```rust
//! use mcpkit_core::error::{McpError, McpResultExt, RESOURCE_NOT_FOUND};
//!
//! fn fetch_data() -> Result<String, McpError> {
//!     let result: Result<(), McpError> = Err(McpError::resource_not_found("user://42"));
//!     result.context("Failed to fetch user data")?;
//!     Ok("data".to_string())
//! }
//!
//! assert_eq!(fetch_data().unwrap_err().code(), RESOURCE_NOT_FOUND);
//! ```

pub mod codes;
mod context;
mod details;
mod jsonrpc;
mod transport;
mod types;

pub use codes::*;
pub use context::McpResultExt;
pub use details::{BoxError, InvalidParamsDetails, TransportDetails};
pub use jsonrpc::JsonRpcError;
pub use transport::TransportErrorKind;
pub use types::McpError;

//! The primary error type for the MCP SDK.
//!
//! This module contains the unified `McpError` enum used by every crate in
//! the workspace, from transports up to the server and client roles.

use miette::Diagnostic;
use thiserror::Error;

use super::codes;
use super::details::{BoxError, InvalidParamsDetails, TransportDetails};
use super::jsonrpc::JsonRpcError;
use super::transport::TransportErrorKind;

/// The primary error type for the MCP SDK.
///
/// Large error variants are boxed to keep `Result<T, McpError>` small.
#[derive(Error, Diagnostic, Debug)]
pub enum McpError {
    // ========================================================================
    // JSON-RPC Protocol Errors (-32700 to -32600)
    // ========================================================================
    /// Invalid JSON was received.
    #[error("Parse error: {message}")]
    #[diagnostic(
        code(mcp::protocol::parse_error),
        help("Ensure the message is valid JSON-RPC 2.0 format")
    )]
    Parse {
        /// Human-readable error message.
        message: String,
        /// The underlying parse error, if available.
        #[source]
        source: Option<BoxError>,
    },

    /// The JSON sent is not a valid Request object.
    #[error("Invalid request: {message}")]
    #[diagnostic(code(mcp::protocol::invalid_request))]
    InvalidRequest {
        /// Human-readable error message.
        message: String,
        /// The underlying error, if available.
        #[source]
        source: Option<BoxError>,
    },

    /// The method does not exist or is not available.
    #[error("Method not found: {method}")]
    #[diagnostic(code(mcp::protocol::method_not_found))]
    MethodNotFound {
        /// The method that was requested.
        method: String,
    },

    /// Invalid method parameter(s) (details boxed to reduce enum size).
    #[error("Invalid params for '{}': {}", .0.method, .0.message)]
    #[diagnostic(code(mcp::protocol::invalid_params))]
    InvalidParams(#[source] Box<InvalidParamsDetails>),

    /// Internal JSON-RPC error.
    #[error("Internal error: {message}")]
    #[diagnostic(code(mcp::protocol::internal_error), severity(error))]
    Internal {
        /// Human-readable error message.
        message: String,
        /// The underlying error, if available.
        #[source]
        source: Option<BoxError>,
    },

    // ========================================================================
    // Session Errors
    // ========================================================================
    /// A request other than `initialize` or `ping` arrived before the
    /// session became active.
    #[error("method {method:?} is invalid during session initialization")]
    #[diagnostic(
        code(mcp::session::initializing),
        help("Send notifications/initialized before issuing other requests")
    )]
    InvalidDuringInitialization {
        /// The rejected method.
        method: String,
    },

    /// The session's connection closed before a call completed.
    #[error("connection closed")]
    #[diagnostic(code(mcp::session::connection_closed))]
    ConnectionClosed,

    /// The local sending table has no entry for the method.
    #[error("method {method:?} not handled")]
    #[diagnostic(code(mcp::session::not_handled))]
    NotHandled {
        /// The method that was not handled.
        method: String,
    },

    /// The method is known, but the peer lacks the capability to serve it.
    #[error("unsupported method: {method}")]
    #[diagnostic(code(mcp::capability::unsupported_method))]
    UnsupportedMethod {
        /// The unsupported method.
        method: String,
    },

    /// An error response received from the peer, preserved verbatim.
    #[error("{}", .0.message)]
    #[diagnostic(code(mcp::rpc))]
    Rpc(Box<JsonRpcError>),

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// Transport-level error (details boxed to reduce enum size).
    #[error("Transport error ({}): {}", .0.kind, .0.message)]
    #[diagnostic(code(mcp::transport::error))]
    Transport(#[source] Box<TransportDetails>),

    // ========================================================================
    // Resource Errors
    // ========================================================================
    /// A requested resource was not found.
    #[error("Resource not found: {uri}")]
    #[diagnostic(
        code(mcp::resource::not_found),
        help("Verify the URI is correct and the resource exists")
    )]
    ResourceNotFound {
        /// The URI of the resource that was not found.
        uri: String,
    },

    // ========================================================================
    // Timeout and Cancellation
    // ========================================================================
    /// An operation timed out.
    #[error("Timeout after {duration:?}: {operation}")]
    #[diagnostic(
        code(mcp::timeout),
        help("Consider increasing the timeout or checking connectivity")
    )]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// How long we waited before timing out.
        duration: std::time::Duration,
    },

    /// An operation was cancelled.
    #[error("Operation cancelled: {operation}")]
    #[diagnostic(code(mcp::cancelled))]
    Cancelled {
        /// The operation that was cancelled.
        operation: String,
        /// Reason for cancellation, if provided.
        reason: Option<String>,
    },

    // ========================================================================
    // Context-Wrapped Errors
    // ========================================================================
    /// An error with additional context.
    #[error("{context}: {source}")]
    #[diagnostic(code(mcp::context))]
    WithContext {
        /// The context message.
        context: String,
        /// The underlying error.
        #[source]
        source: Box<McpError>,
    },
}

// ============================================================================
// Error Construction Helpers
// ============================================================================

impl McpError {
    /// Create a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
            source: None,
        }
    }

    /// Create a parse error with a source.
    pub fn parse_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Parse {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an invalid request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
            source: None,
        }
    }

    /// Create a method not found error.
    pub fn method_not_found(method: impl Into<String>) -> Self {
        Self::MethodNotFound {
            method: method.into(),
        }
    }

    /// Create an invalid params error.
    pub fn invalid_params(method: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParams(Box::new(InvalidParamsDetails {
            method: method.into(),
            message: message.into(),
            source: None,
        }))
    }

    /// Create an invalid params error wrapping a decode failure.
    pub fn invalid_params_with_source<E: std::error::Error + Send + Sync + 'static>(
        method: impl Into<String>,
        source: E,
    ) -> Self {
        Self::InvalidParams(Box::new(InvalidParamsDetails {
            method: method.into(),
            message: source.to_string(),
            source: Some(Box::new(source)),
        }))
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Create an internal error with a source.
    pub fn internal_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a transport error.
    pub fn transport(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self::Transport(Box::new(TransportDetails {
            kind,
            message: message.into(),
            source: None,
        }))
    }

    /// Create a transport error with a source.
    pub fn transport_with_source<E: std::error::Error + Send + Sync + 'static>(
        kind: TransportErrorKind,
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Transport(Box::new(TransportDetails {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }))
    }

    /// Create a resource not found error.
    pub fn resource_not_found(uri: impl Into<String>) -> Self {
        Self::ResourceNotFound { uri: uri.into() }
    }

    /// Create an unsupported method error.
    pub fn unsupported_method(method: impl Into<String>) -> Self {
        Self::UnsupportedMethod {
            method: method.into(),
        }
    }

    /// Create the error returned for requests that arrive before the
    /// handshake has completed.
    pub fn invalid_during_initialization(method: impl Into<String>) -> Self {
        Self::InvalidDuringInitialization {
            method: method.into(),
        }
    }

    /// Create a not handled error.
    pub fn not_handled(method: impl Into<String>) -> Self {
        Self::NotHandled {
            method: method.into(),
        }
    }

    /// Rebuild an error from a JSON-RPC error response.
    #[must_use]
    pub fn from_rpc(error: JsonRpcError) -> Self {
        Self::Rpc(Box::new(error))
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, duration: std::time::Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a cancelled error.
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
            reason: None,
        }
    }

    /// Create a cancelled error with reason.
    pub fn cancelled_with_reason(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
            reason: Some(reason.into()),
        }
    }

    /// Get the JSON-RPC error code for this error.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Self::Parse { .. } => codes::PARSE_ERROR,
            Self::InvalidRequest { .. } => codes::INVALID_REQUEST,
            Self::MethodNotFound { .. } => codes::METHOD_NOT_FOUND,
            Self::InvalidParams(_) => codes::INVALID_PARAMS,
            Self::Internal { .. } => codes::INTERNAL_ERROR,
            Self::InvalidDuringInitialization { .. } => codes::INVALID_REQUEST,
            Self::ConnectionClosed => codes::SERVER_ERROR_START,
            Self::NotHandled { .. } => codes::METHOD_NOT_FOUND,
            Self::UnsupportedMethod { .. } => codes::UNSUPPORTED_METHOD,
            Self::Rpc(error) => error.code,
            Self::Transport(_) => codes::SERVER_ERROR_START,
            Self::ResourceNotFound { .. } => codes::RESOURCE_NOT_FOUND,
            Self::Timeout { .. } => codes::SERVER_ERROR_START - 7,
            Self::Cancelled { .. } => codes::SERVER_ERROR_START - 8,
            Self::WithContext { source, .. } => source.code(),
        }
    }

    /// Whether this error means the underlying connection is gone.
    #[must_use]
    pub fn is_connection_closed(&self) -> bool {
        match self {
            Self::ConnectionClosed => true,
            Self::Transport(details) => details.kind == TransportErrorKind::ConnectionClosed,
            Self::WithContext { source, .. } => source.is_connection_closed(),
            _ => false,
        }
    }

    /// Whether this error is a local cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled { .. } => true,
            Self::WithContext { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}

// ============================================================================
// Standard Error Conversions
// ============================================================================

impl From<serde_json::Error> for McpError {
    fn from(err: serde_json::Error) -> Self {
        Self::parse_with_source("JSON serialization/deserialization error", err)
    }
}

impl From<std::io::Error> for McpError {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::ConnectionRefused => {
                TransportErrorKind::ConnectionFailed
            }
            std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::UnexpectedEof => TransportErrorKind::ConnectionClosed,
            std::io::ErrorKind::TimedOut => TransportErrorKind::Timeout,
            std::io::ErrorKind::WriteZero => TransportErrorKind::WriteFailed,
            _ => TransportErrorKind::ReadFailed,
        };
        let message = err.to_string();
        Self::transport_with_source(kind, message, err)
    }
}

impl From<JsonRpcError> for McpError {
    fn from(err: JsonRpcError) -> Self {
        Self::from_rpc(err)
    }
}

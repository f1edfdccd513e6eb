//! Transport error types.

use mcpkit_core::error::{McpError, TransportDetails, TransportErrorKind};
use thiserror::Error;

/// Errors that can occur during transport operations.
#[derive(Error, Debug)]
pub enum TransportError {
    /// I/O error from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Connection could not be established.
    #[error("Connection error: {message}")]
    Connection {
        /// Error message.
        message: String,
    },

    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Message was too large.
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge {
        /// Actual message size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// The peer broke the framing or batching rules.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// An HTTP request returned an unexpected status.
    #[error("HTTP {status}: {message}")]
    HttpStatus {
        /// The status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// Timeout occurred.
    #[error("{operation} timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// How long the operation waited.
        duration: std::time::Duration,
    },
}

impl TransportError {
    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Get the transport error kind.
    #[must_use]
    pub fn kind(&self) -> TransportErrorKind {
        match self {
            Self::Io(e) => match e.kind() {
                std::io::ErrorKind::ConnectionRefused | std::io::ErrorKind::NotConnected => {
                    TransportErrorKind::ConnectionFailed
                }
                std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::ConnectionAborted
                | std::io::ErrorKind::BrokenPipe
                | std::io::ErrorKind::UnexpectedEof => TransportErrorKind::ConnectionClosed,
                std::io::ErrorKind::TimedOut => TransportErrorKind::Timeout,
                std::io::ErrorKind::WriteZero => TransportErrorKind::WriteFailed,
                _ => TransportErrorKind::ReadFailed,
            },
            Self::Json(_) | Self::MessageTooLarge { .. } => TransportErrorKind::InvalidMessage,
            Self::Connection { .. } => TransportErrorKind::ConnectionFailed,
            Self::ConnectionClosed => TransportErrorKind::ConnectionClosed,
            Self::Protocol { .. } => TransportErrorKind::ProtocolViolation,
            Self::HttpStatus { .. } => TransportErrorKind::HttpStatus,
            Self::Timeout { .. } => TransportErrorKind::Timeout,
        }
    }
}

impl From<TransportError> for McpError {
    fn from(err: TransportError) -> Self {
        if matches!(err, TransportError::ConnectionClosed) {
            return Self::ConnectionClosed;
        }
        Self::Transport(Box::new(TransportDetails {
            kind: err.kind(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        }))
    }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::Timeout {
                operation: "HTTP request".to_string(),
                duration: std::time::Duration::ZERO,
            };
        }
        match err.status() {
            Some(status) => Self::HttpStatus {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None => Self::connection(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            TransportError::ConnectionClosed.kind(),
            TransportErrorKind::ConnectionClosed
        );
        assert_eq!(
            TransportError::Timeout {
                operation: "test".to_string(),
                duration: std::time::Duration::from_secs(1),
            }
            .kind(),
            TransportErrorKind::Timeout
        );
        assert_eq!(
            TransportError::protocol("duplicate id").kind(),
            TransportErrorKind::ProtocolViolation
        );
        let broken = std::io::Error::from(std::io::ErrorKind::BrokenPipe);
        assert_eq!(
            TransportError::from(broken).kind(),
            TransportErrorKind::ConnectionClosed
        );
    }

    #[test]
    fn test_mcp_error_conversion() {
        let mcp_err: McpError = TransportError::ConnectionClosed.into();
        assert!(matches!(mcp_err, McpError::ConnectionClosed));

        let mcp_err: McpError = TransportError::HttpStatus {
            status: 500,
            message: "boom".to_string(),
        }
        .into();
        match mcp_err {
            McpError::Transport(details) => {
                assert_eq!(details.kind, TransportErrorKind::HttpStatus);
            }
            other => panic!("Expected Transport error, got {other:?}"),
        }
    }
}

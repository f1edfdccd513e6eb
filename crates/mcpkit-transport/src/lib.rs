//! Transport abstractions for the MCP SDK.
//!
//! A transport moves JSON-RPC messages between the two ends of one MCP
//! connection. Sessions only ever see the [`Transport`] trait (or its
//! object-safe form [`DynTransport`]), so every transport below is
//! interchangeable.
//!
//! # Available Transports
//!
//! | Transport | Use Case | Feature Flag |
//! |-----------|----------|--------------|
//! | [`StdioTransport`] | Server reading stdin and writing stdout | Always available |
//! | [`IoTransport`] | Newline-delimited JSON over any async byte streams | Always available |
//! | [`memory::pair`] | Tests and in-process connections | Always available |
//! | [`CommandTransport`] | Client spawning a server as a subprocess | Always available |
//! | [`LoggingTransport`] | Wrapper recording every message to a writer | Always available |
//! | [`http::SseServer`] / [`http::SseClientTransport`] | SSE (2024-11-05) | `http` |
//! | [`http::StreamableHttpServer`] / [`http::StreamableClientTransport`] | Streamable HTTP | `http` |
//!
//! # Example
//!
//! ```rust
//! use mcpkit_core::protocol::{Message, Request};
//! use mcpkit_transport::{Transport, memory};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), mcpkit_transport::TransportError> {
//! let (client, server) = memory::pair();
//! client.send(Request::new("ping", 1).into()).await?;
//!
//! let received = server.recv().await?;
//! assert!(matches!(received, Some(Message::Request(_))));
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]

pub mod error;
pub mod logging;
pub mod memory;
pub mod runtime;
pub mod spawn;
pub mod stdio;
pub mod traits;

#[cfg(feature = "http")]
pub mod http;

pub use error::TransportError;
pub use logging::LoggingTransport;
pub use memory::MemoryTransport;
pub use spawn::{CommandTransport, CommandTransportBuilder};
pub use stdio::{IoTransport, StdioTransport};
pub use traits::{
    DynTransport, Transport, TransportMetadata, related_request, with_related_request,
};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::TransportError;
    pub use crate::memory;
    pub use crate::spawn::CommandTransport;
    pub use crate::stdio::{IoTransport, StdioTransport};
    pub use crate::traits::{DynTransport, Transport, TransportMetadata};
}

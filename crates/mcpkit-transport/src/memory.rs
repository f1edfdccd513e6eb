//! In-memory transport for testing.
//!
//! [`pair`] returns two connected [`IoTransport`]s backed by in-process byte
//! pipes, so tests exercise exactly the same newline-delimited framing as a
//! real stdio connection without any process or socket.
//!
//! # Example
//!
//! ```rust
//! use mcpkit_transport::{Transport, memory};
//!
//! let (client_transport, server_transport) = memory::pair();
//! assert!(client_transport.is_connected());
//! assert!(server_transport.is_connected());
//! ```

use tokio::io::{DuplexStream, ReadHalf, WriteHalf};

use crate::stdio::IoTransport;
use crate::traits::TransportMetadata;

/// One end of an in-memory connection.
pub type MemoryTransport = IoTransport<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;

/// Default pipe buffer size in bytes.
pub const DEFAULT_CAPACITY: usize = 64 * 1024;

/// Create a connected pair of memory transports.
///
/// Messages sent on the first transport are received on the second, and
/// vice versa. Closing either end ends the other's stream.
#[must_use]
pub fn pair() -> (MemoryTransport, MemoryTransport) {
    pair_with_capacity(DEFAULT_CAPACITY)
}

/// Create a connected pair with a specific pipe buffer size.
#[must_use]
pub fn pair_with_capacity(capacity: usize) -> (MemoryTransport, MemoryTransport) {
    let (a, b) = tokio::io::duplex(capacity);
    let (a_read, a_write) = tokio::io::split(a);
    let (b_read, b_write) = tokio::io::split(b);

    let first = IoTransport::new(a_read, a_write).with_metadata(
        TransportMetadata::new("memory")
            .local_addr("peer-0")
            .remote_addr("peer-1")
            .connected_now(),
    );
    let second = IoTransport::new(b_read, b_write).with_metadata(
        TransportMetadata::new("memory")
            .local_addr("peer-1")
            .remote_addr("peer-0")
            .connected_now(),
    );
    (first, second)
}

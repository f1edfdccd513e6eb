//! Async primitives shared by the transports.
//!
//! Locks and wake-ups come from `async-lock` and `event-listener` so that
//! no transport holds a Tokio-specific lock guard across an await. Task
//! spawning, timers and process handling use Tokio directly.

/// An async mutex.
pub use async_lock::Mutex as AsyncMutex;

/// An event used to wake tasks waiting for new buffered output.
pub use event_listener::Event as Notify;

/// A cancellation signal shared between a transport and its I/O tasks.
pub use tokio_util::sync::CancellationToken;

/// Lock a `std::sync::Mutex`, recovering the data if a holder panicked.
///
/// Used for short, synchronous bookkeeping that must also run from `Drop`.
pub(crate) fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

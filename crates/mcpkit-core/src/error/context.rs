//! Attaching context to errors on their way up.

use super::types::McpError;

/// Adds a context message to a failed `Result`, converting the error to
/// [`McpError`] on the way.
///
/// The wrapped error keeps its code: [`McpError::code`],
/// [`McpError::is_connection_closed`] and [`McpError::is_cancelled`] all
/// look through the context.
///
/// # Example
///
/// ```rust
/// use mcpkit_core::error::{McpError, McpResultExt};
///
/// fn load(path: &str) -> Result<String, McpError> {
///     std::fs::read_to_string(path).with_context(|| format!("reading {path}"))
/// }
///
/// let err = load("/definitely/not/here").unwrap_err();
/// assert!(err.to_string().starts_with("reading /definitely/not/here: "));
/// ```
pub trait McpResultExt<T> {
    /// Wrap the error with `context`.
    fn context<C: Into<String>>(self, context: C) -> Result<T, McpError>;

    /// Like [`context`](Self::context), but only builds the message on error.
    fn with_context<C, F>(self, f: F) -> Result<T, McpError>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T, E: Into<McpError>> McpResultExt<T> for Result<T, E> {
    fn context<C: Into<String>>(self, context: C) -> Result<T, McpError> {
        self.map_err(|e| McpError::WithContext {
            context: context.into(),
            source: Box::new(e.into()),
        })
    }

    fn with_context<C, F>(self, f: F) -> Result<T, McpError>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        self.map_err(|e| McpError::WithContext {
            context: f().into(),
            source: Box::new(e.into()),
        })
    }
}

//! HTTP transport configuration types and constants.

use std::time::Duration;

/// Header name for the MCP session ID.
///
/// Note: HTTP/2 requires lowercase header names. HTTP/1.1 headers are
/// case-insensitive, so lowercase works universally.
pub const MCP_SESSION_ID_HEADER: &str = "mcp-session-id";

/// Header name used to resume an SSE stream.
pub const LAST_EVENT_ID_HEADER: &str = "last-event-id";

/// Default maximum message size (16 MB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Server-side configuration shared by the SSE and streamable HTTP handlers.
#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    /// Path the handler is mounted at (e.g., `/mcp`).
    pub endpoint: String,
    /// Allowed origins for DNS rebinding protection.
    /// If empty, origin validation is disabled.
    pub allowed_origins: Vec<String>,
    /// Maximum message size in bytes.
    pub max_message_size: usize,
}

impl HttpServerConfig {
    /// Create a configuration mounted at `endpoint`.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            allowed_origins: Vec::new(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    /// Add an allowed origin for DNS rebinding protection.
    #[must_use]
    pub fn with_allowed_origin(mut self, origin: impl Into<String>) -> Self {
        self.allowed_origins.push(origin.into());
        self
    }

    /// Set multiple allowed origins at once.
    #[must_use]
    pub fn with_allowed_origins(
        mut self,
        origins: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.allowed_origins
            .extend(origins.into_iter().map(Into::into));
        self
    }

    /// Set maximum message size.
    #[must_use]
    pub const fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Check if an origin is allowed.
    #[must_use]
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        self.allowed_origins.is_empty() || self.allowed_origins.iter().any(|o| o == origin)
    }
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self::new("/mcp")
    }
}

/// Client-side configuration for the HTTP transports.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// URL of the MCP endpoint.
    pub url: String,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Timeout for requests that are not event streams.
    pub request_timeout: Duration,
    /// How many times to resume a broken event stream.
    pub max_reconnect_attempts: u32,
    /// Whether the streamable client opens a standalone GET stream for
    /// server-initiated traffic.
    pub standalone_stream: bool,
    /// Custom headers to include in requests.
    pub headers: Vec<(String, String)>,
    /// Maximum message size in bytes.
    pub max_message_size: usize,
}

impl HttpClientConfig {
    /// Create a configuration for `url`.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(60),
            max_reconnect_attempts: 3,
            standalone_stream: false,
            headers: Vec::new(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    /// Set the connection timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the request timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set maximum stream resumption attempts.
    #[must_use]
    pub const fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Open a standalone GET stream once the session id is known.
    #[must_use]
    pub const fn with_standalone_stream(mut self, enabled: bool) -> Self {
        self.standalone_stream = enabled;
        self
    }

    /// Add a custom header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the maximum message size.
    #[must_use]
    pub const fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }
}

//! Serving a [`Server`] over HTTP.
//!
//! Both helpers return the transport's server object; mount its
//! [`router`](SseServer::router) in an axum app or serve it directly.
//! Each HTTP session becomes one [`ServerSession`](crate::ServerSession).

use mcpkit_transport::http::{HttpServerConfig, SseServer, StreamableHttpServer};

use crate::server::Server;

impl Server {
    /// Serve this server over the HTTP+SSE transport.
    #[must_use]
    pub fn sse_server(&self, config: HttpServerConfig) -> SseServer {
        let server = self.clone();
        SseServer::new(config, move |transport| {
            let session = server.connect(transport);
            async move { session.wait().await }
        })
    }

    /// Serve this server over the streamable HTTP transport.
    #[must_use]
    pub fn streamable_http_server(&self, config: HttpServerConfig) -> StreamableHttpServer {
        let server = self.clone();
        StreamableHttpServer::new(config, move |transport| {
            let session = server.connect(transport);
            async move { session.wait().await }
        })
    }
}

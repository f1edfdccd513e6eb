//! MCP server over HTTP.
//!
//! Mounts the same server twice: streamable HTTP at `/mcp` and the older
//! HTTP+SSE transport at `/sse`.
//!
//! ## Running
//!
//! ```bash
//! MCP_ADDR=127.0.0.1:8080 cargo run -p http-server-demo
//! ```

use std::time::Duration;

use mcpkit::prelude::*;
use mcpkit::transport::http::HttpServerConfig;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::info;

#[derive(Deserialize, JsonSchema)]
struct Greet {
    /// Who to greet.
    name: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let addr = std::env::var("MCP_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());

    let server = Server::new(
        Implementation::new("http-demo", env!("CARGO_PKG_VERSION")),
        ServerOptions::new().keep_alive(Duration::from_secs(30)),
    );
    server.add_tools([ServerTool::typed(
        "greet",
        "Say hi to someone",
        |_ctx, _session, args: Greet| async move {
            Ok::<_, String>(CallToolResult::text(format!("hi {}", args.name)))
        },
    )]);
    server.add_resources([ServerResource::new(
        Resource::new("info://server", "server").mime_type("text/plain"),
        |_ctx, _session, params: ReadResourceParams| async move {
            Ok(ReadResourceResult::new(vec![ResourceContents::text(
                params.uri,
                "served over HTTP",
            )]))
        },
    )])?;

    let streamable = server.streamable_http_server(HttpServerConfig::default());
    let sse = server.sse_server(HttpServerConfig::new("/sse"));
    let app = streamable.router().merge(sse.router());

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %listener.local_addr()?, "streamable HTTP on /mcp, SSE on /sse");
    axum::serve(listener, app).await?;
    Ok(())
}

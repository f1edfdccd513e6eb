//! MCP client.
//!
//! Connects to a server, lists its tools and calls `greet`. The target is
//! either an `http://` URL (streamable HTTP) or a command to spawn and talk
//! to over its stdio.
//!
//! ## Running
//!
//! ```bash
//! cargo run -p client-demo -- http://127.0.0.1:8080/mcp
//! cargo run -p client-demo -- cargo run -q -p stdio-server-demo
//! ```

use futures::TryStreamExt;
use mcpkit::prelude::*;
use mcpkit::transport::http::{HttpClientConfig, StreamableClientTransport};
use serde_json::json;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let Some(target) = args.next() else {
        eprintln!("usage: client-demo <url | command [args...]>");
        std::process::exit(2);
    };

    let client = Client::new(
        Implementation::new("client-demo", env!("CARGO_PKG_VERSION")),
        ClientOptions::new()
            .on_logging_message(|_session, msg| info!(level = %msg.level, data = %msg.data, "server log"))
            .on_tools_list_changed(|_session, _params| info!("server tools changed")),
    );
    if let Ok(dir) = std::env::current_dir() {
        if let Ok(root) = url::Url::from_directory_path(&dir) {
            client.add_roots([Root::new(root.to_string()).name("cwd")]);
        }
    }

    let session = if target.starts_with("http://") || target.starts_with("https://") {
        client
            .connect(StreamableClientTransport::new(HttpClientConfig::new(&target))?)
            .await?
    } else {
        client.connect(CommandTransport::spawn(&target, args)?).await?
    };
    if let Some(server) = session.server_info() {
        info!(name = %server.name, version = %server.version, "connected");
    }

    let ctx = Context::new();
    let tools: Vec<Tool> = session.tools(ctx.clone()).try_collect().await?;
    for tool in &tools {
        println!("{}: {}", tool.name, tool.description.as_deref().unwrap_or(""));
    }

    if tools.iter().any(|t| t.name == "greet") {
        let result = session
            .call_tool(&ctx, &CallToolParams::new("greet", json!({"name": "client-demo"})))
            .await?;
        for content in &result.content {
            if let Some(text) = content.as_text() {
                println!("greet -> {text}");
            }
        }
    }

    session.close().await?;
    Ok(())
}

//! MCP server over stdio.
//!
//! Serves a `greet` tool, an `add` tool, a `code_review` prompt and the
//! files under a directory as `file://` resources.
//!
//! ## Running
//!
//! ```bash
//! cargo run -p stdio-server-demo -- ./some/dir
//! ```
//!
//! Logs go to stderr; set `RUST_LOG=debug` to see protocol traffic.

use std::path::PathBuf;

use mcpkit::prelude::*;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::info;

#[derive(Deserialize, JsonSchema)]
struct Greet {
    /// Who to greet.
    name: String,
}

#[derive(Deserialize, JsonSchema)]
struct Add {
    a: f64,
    b: f64,
}

#[derive(Deserialize, JsonSchema)]
struct CodeReview {
    /// The code to review.
    code: String,
    /// What to focus on.
    focus: Option<String>,
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

    let dir = std::env::args()
        .nth(1)
        .map_or_else(std::env::current_dir, |d| Ok(PathBuf::from(d)))?;

    let server = Server::new(
        Implementation::new("stdio-demo", env!("CARGO_PKG_VERSION")),
        ServerOptions::new()
            .instructions("Greet people, add numbers and read files under the client's roots.")
            .on_initialized(|session, _params| {
                let client = session.client_info().map(|p| p.client_info.name);
                info!(client = ?client, "client initialized");
            }),
    );

    server.add_tools([
        ServerTool::typed("greet", "Say hi to someone", |_ctx, _session, args: Greet| async move {
            Ok::<_, String>(CallToolResult::text(format!("hi {}", args.name)))
        }),
        ServerTool::typed("add", "Add two numbers", |_ctx, session: std::sync::Arc<ServerSession>, args: Add| async move {
            let sum = args.a + args.b;
            session
                .log(LoggingMessageParams::new(LoggingLevel::Debug, serde_json::json!({"sum": sum})))
                .await
                .map_err(|e| e.to_string())?;
            Ok::<_, String>(CallToolResult::text(sum.to_string()))
        }),
    ]);

    server.add_prompts([ServerPrompt::typed(
        "code_review",
        "Ask for a review of a piece of code",
        |_ctx, _session, args: CodeReview| async move {
            let focus = args.focus.unwrap_or_else(|| "correctness".to_string());
            Ok(GetPromptResult::messages(vec![PromptMessage::user(format!(
                "Please review this code, focusing on {focus}:\n\n{}",
                args.code
            ))]))
        },
    )]);

    let template = ResourceTemplate::new("file:///{+path}", "files")
        .description(format!("Files under {}", dir.display()));
    server.add_resource_templates([ServerResourceTemplate::with_handler(
        template,
        file_resource_handler(&dir)?,
    )?]);

    info!(dir = %dir.display(), "serving over stdio");
    server.run(StdioTransport::new()).await?;
    Ok(())
}

//! Client against an in-process server over an in-memory pair.

use std::sync::Arc;
use std::time::Duration;

use futures::TryStreamExt;
use futures::future::BoxFuture;
use mcpkit_client::{Client, ClientOptions, ClientSession, SessionState};
use mcpkit_core::capability::Implementation;
use mcpkit_core::error::{INTERNAL_ERROR, McpError, UNSUPPORTED_METHOD};
use mcpkit_core::types::{
    CallToolResult, CreateMessageParams, CreateMessageResult, LoggingLevel, LoggingMessageParams,
    ProgressParams, Root,
};
use mcpkit_core::ProgressToken;
use mcpkit_server::{Server, ServerOptions, ServerSession, ServerTool};
use mcpkit_session::{Connection, Context};
use mcpkit_transport::memory;
use pretty_assertions::assert_eq;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;

#[derive(Deserialize, JsonSchema)]
struct Empty {}

fn noop_tool(name: &str) -> ServerTool {
    ServerTool::typed(name, "does nothing", |_ctx, _session, _args: Empty| async move {
        Ok::<_, String>(CallToolResult::text("ok"))
    })
}

fn client(options: ClientOptions) -> Client {
    Client::new(Implementation::new("test-client", "0.1.0"), options)
}

async fn connect(server: &Server, client: &Client) -> (Arc<ClientSession>, Arc<ServerSession>) {
    let (a, b) = memory::pair();
    let server_session = server.connect(a);
    let client_session = client.connect(b).await.unwrap();
    for _ in 0..200 {
        if server_session.state() == SessionState::Active {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(server_session.state(), SessionState::Active);
    (client_session, server_session)
}

async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out")
        .expect("channel closed")
}

#[tokio::test]
async fn test_handshake_records_server() {
    let server = Server::new(
        Implementation::new("srv", "2.0.0"),
        ServerOptions::new().instructions("read the docs"),
    );
    let client = client(ClientOptions::default());
    let (session, server_session) = connect(&server, &client).await;

    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(session.server_info().unwrap().name, "srv");
    let init = session.initialize_result().unwrap();
    assert_eq!(init.instructions.as_deref(), Some("read the docs"));
    assert_eq!(init.protocol_version, "2024-11-05");

    let info = server_session.client_info().unwrap();
    assert_eq!(info.client_info.name, "test-client");
    assert!(info.capabilities.has_roots());
    assert!(!info.capabilities.has_sampling());
    assert_eq!(client.sessions().len(), 1);
}

#[tokio::test]
async fn test_server_lists_client_roots() {
    let server = Server::new(Implementation::new("srv", "1.0.0"), ServerOptions::default());
    let client = client(ClientOptions::default());
    client.add_roots([Root::new("file:///tmp/data")]);
    let (_session, server_session) = connect(&server, &client).await;

    let roots = server_session.list_roots(&Context::new()).await.unwrap();
    assert_eq!(roots.roots, vec![Root::new("file:///tmp/data")]);
}

#[tokio::test]
async fn test_roots_change_notifies_server() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let server = Server::new(
        Implementation::new("srv", "1.0.0"),
        ServerOptions::new().on_roots_list_changed(move |_session, _params| {
            let _ = tx.send(());
        }),
    );
    let client = client(ClientOptions::default());
    let (_session, server_session) = connect(&server, &client).await;

    client.add_roots([Root::new("file:///a")]);
    recv(&mut rx).await;
    let roots = server_session.list_roots(&Context::new()).await.unwrap();
    assert_eq!(roots.roots.len(), 1);

    client.remove_roots(["file:///a"]);
    recv(&mut rx).await;
    // Removing an unknown root changes nothing and sends nothing.
    client.remove_roots(["file:///missing"]);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_sampling_without_handler_is_unsupported() {
    let server = Server::new(Implementation::new("srv", "1.0.0"), ServerOptions::default());
    let client = client(ClientOptions::default());
    let (_session, server_session) = connect(&server, &client).await;

    let err = server_session
        .create_message(&Context::new(), &CreateMessageParams::simple("hi", 10))
        .await
        .unwrap_err();
    assert_eq!(err.code(), UNSUPPORTED_METHOD);
}

#[tokio::test]
async fn test_sampling_handler_answers() {
    let server = Server::new(Implementation::new("srv", "1.0.0"), ServerOptions::default());
    let client = client(ClientOptions::new().sampling(|_ctx, _session, params| async move {
        Ok::<_, McpError>(CreateMessageResult::text(
            "echo",
            format!("{} tokens", params.max_tokens),
        ))
    }));
    let (_session, server_session) = connect(&server, &client).await;
    assert!(server_session.client_info().unwrap().capabilities.has_sampling());

    let result = server_session
        .create_message(&Context::new(), &CreateMessageParams::simple("hi", 42))
        .await
        .unwrap();
    assert_eq!(result.model, "echo");
    assert_eq!(result.content.as_text(), Some("42 tokens"));
}

#[tokio::test]
async fn test_log_messages_filtered_and_ordered() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let server = Server::new(Implementation::new("srv", "1.0.0"), ServerOptions::default());
    let client = client(ClientOptions::new().on_logging_message(move |_session, msg| {
        let _ = tx.send(msg.level);
    }));
    let (session, server_session) = connect(&server, &client).await;

    session
        .set_level(&Context::new(), LoggingLevel::Warning)
        .await
        .unwrap();
    for level in [
        LoggingLevel::Debug,
        LoggingLevel::Info,
        LoggingLevel::Warning,
        LoggingLevel::Alert,
    ] {
        server_session
            .log(LoggingMessageParams::new(level, json!(level.to_string())))
            .await
            .unwrap();
    }

    assert_eq!(recv(&mut rx).await, LoggingLevel::Warning);
    assert_eq!(recv(&mut rx).await, LoggingLevel::Alert);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_tool_stream_walks_pages() {
    let server = Server::new(
        Implementation::new("srv", "1.0.0"),
        ServerOptions::new().page_size(2),
    );
    server.add_tools(["elderberry", "cherry", "apple", "durian", "banana"].map(noop_tool));
    let client = client(ClientOptions::default());
    let (session, _server_session) = connect(&server, &client).await;

    let names: Vec<String> = session
        .tools(Context::new())
        .map_ok(|tool| tool.name)
        .try_collect()
        .await
        .unwrap();
    assert_eq!(names, vec!["apple", "banana", "cherry", "durian", "elderberry"]);
}

#[tokio::test]
async fn test_list_changed_callback() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let server = Server::new(Implementation::new("srv", "1.0.0"), ServerOptions::default());
    let client = client(ClientOptions::new().on_tools_list_changed(move |_session, _params| {
        let _ = tx.send(());
    }));
    let (_session, _server_session) = connect(&server, &client).await;

    server.add_tools([noop_tool("late")]);
    recv(&mut rx).await;
}

#[tokio::test]
async fn test_progress_reaches_server() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let server = Server::new(
        Implementation::new("srv", "1.0.0"),
        ServerOptions::new().on_progress(move |_session, params| {
            let _ = tx.send(params);
        }),
    );
    let client = client(ClientOptions::default());
    let (session, _server_session) = connect(&server, &client).await;

    let params = ProgressParams::new(ProgressToken::String("job".into()), 3.0, Some(10.0));
    session.notify_progress(params.clone()).await.unwrap();
    assert_eq!(recv(&mut rx).await, params);
}

#[tokio::test]
async fn test_closing_drops_session() {
    let server = Server::new(Implementation::new("srv", "1.0.0"), ServerOptions::default());
    let client = client(ClientOptions::default());
    let (session, server_session) = connect(&server, &client).await;

    session.close().await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), server_session.wait())
        .await
        .unwrap();
    for _ in 0..200 {
        if client.sessions().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(client.sessions().is_empty());
    assert_eq!(session.state(), SessionState::Closed);

    let err = session.ping(&Context::new()).await.unwrap_err();
    assert!(err.is_connection_closed());
}

#[tokio::test]
async fn test_failed_handshake_names_the_step() {
    let (a, b) = memory::pair();
    let peer = Connection::new(a);
    peer.start(Arc::new(|_ctx, _method: String, _params: Value| {
        let fut: BoxFuture<'static, Result<Value, McpError>> =
            Box::pin(async { Err(McpError::internal("not today")) });
        fut
    }));

    let err = client(ClientOptions::default()).connect(b).await.unwrap_err();
    assert_eq!(err.code(), INTERNAL_ERROR);
    let message = err.to_string();
    assert!(message.starts_with("initialize handshake: "), "{message}");
    assert!(message.contains("not today"), "{message}");
}

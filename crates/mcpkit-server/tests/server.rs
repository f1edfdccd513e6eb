//! Server behaviour seen from a bare JSON-RPC client connection.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use mcpkit_core::capability::{ClientCapabilities, Implementation, InitializeParams, InitializeResult};
use mcpkit_core::error::{INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND, McpError, RESOURCE_NOT_FOUND};
use mcpkit_core::types::{
    CallToolResult, ListRootsResult, ListToolsResult, LoggingLevel, LoggingMessageParams,
    ReadResourceResult, ResourceContents, ResourceTemplate, Root,
};
use mcpkit_server::{
    Server, ServerOptions, ServerResource, ServerResourceTemplate, ServerSession, ServerTool,
    SessionState, file_resource_handler,
};
use mcpkit_session::{Connection, Context};
use mcpkit_transport::memory;
use pretty_assertions::assert_eq;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use url::Url;

#[derive(Deserialize, JsonSchema)]
struct Greet {
    name: String,
}

fn greeter(options: ServerOptions) -> Server {
    let server = Server::new(Implementation::new("greeter", "1.0.0"), options);
    server.add_tools([
        ServerTool::typed("greet", "Say hi", |_ctx, _session, args: Greet| async move {
            Ok::<_, String>(CallToolResult::text(format!("Hi {}", args.name)))
        }),
        ServerTool::typed("fail", "Always fails", |_ctx, _session, _args: Greet| async move {
            Err::<CallToolResult, _>("mission failed")
        }),
    ]);
    server
}

/// A raw client: answers `roots/list` with `roots` and forwards every
/// notification it receives.
struct RawClient {
    connection: Arc<Connection>,
    notifications: mpsc::UnboundedReceiver<(String, Value)>,
}

fn raw_client(server: &Server, roots: Vec<Root>) -> (RawClient, Arc<ServerSession>) {
    let (a, b) = memory::pair();
    let session = server.connect(a);
    let connection = Connection::new(b);
    let (tx, notifications) = mpsc::unbounded_channel();
    connection.start(Arc::new(move |_ctx, method: String, params: Value| {
        let roots = roots.clone();
        let tx = tx.clone();
        let fut: BoxFuture<'static, Result<Value, McpError>> = Box::pin(async move {
            if method == "roots/list" {
                let result = ListRootsResult {
                    roots,
                    ..ListRootsResult::default()
                };
                return Ok(serde_json::to_value(result).unwrap());
            }
            if method.starts_with("notifications/") {
                let _ = tx.send((method, params));
                return Ok(Value::Null);
            }
            Err(McpError::method_not_found(method))
        });
        fut
    }));
    (
        RawClient {
            connection,
            notifications,
        },
        session,
    )
}

impl RawClient {
    async fn call(&self, method: &str, params: Value) -> Result<Value, McpError> {
        self.connection.call(&Context::new(), method, params).await
    }

    async fn initialize(&self) -> InitializeResult {
        let params = InitializeParams::new(
            Implementation::new("raw", "0.1.0"),
            ClientCapabilities::new().with_roots(),
        );
        let result = self
            .call("initialize", serde_json::to_value(params).unwrap())
            .await
            .unwrap();
        self.connection
            .notify("notifications/initialized", json!({}))
            .await
            .unwrap();
        serde_json::from_value(result).unwrap()
    }

    async fn next_notification(&mut self) -> (String, Value) {
        tokio::time::timeout(Duration::from_secs(5), self.notifications.recv())
            .await
            .expect("timed out waiting for notification")
            .expect("client closed")
    }
}

async fn wait_active(session: &ServerSession) {
    for _ in 0..200 {
        if session.state() == SessionState::Active {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("session never became active");
}

#[tokio::test]
async fn test_initialize_and_call_tool() {
    let server = greeter(ServerOptions::new().instructions("be nice"));
    let (client, session) = raw_client(&server, Vec::new());

    let init = client.initialize().await;
    assert_eq!(init.server_info.name, "greeter");
    assert_eq!(init.instructions.as_deref(), Some("be nice"));
    assert!(init.capabilities.has_tools());
    wait_active(&session).await;
    assert_eq!(session.client_info().unwrap().client_info.name, "raw");

    let result = client
        .call("tools/call", json!({"name": "greet", "arguments": {"name": "user"}}))
        .await
        .unwrap();
    let result: CallToolResult = serde_json::from_value(result).unwrap();
    assert_eq!(result.content[0].as_text(), Some("Hi user"));
    assert!(!result.is_error);
}

#[tokio::test]
async fn test_tool_errors_are_results() {
    let server = greeter(ServerOptions::default());
    let (client, _session) = raw_client(&server, Vec::new());
    client.initialize().await;

    let result = client
        .call("tools/call", json!({"name": "fail", "arguments": {"name": "x"}}))
        .await
        .unwrap();
    let result: CallToolResult = serde_json::from_value(result).unwrap();
    assert!(result.is_error);
    assert_eq!(result.content[0].as_text(), Some("mission failed"));

    let result = client
        .call("tools/call", json!({"name": "greet", "arguments": {"name": "x", "extra": 1}}))
        .await
        .unwrap();
    let result: CallToolResult = serde_json::from_value(result).unwrap();
    assert!(result.is_error);

    let err = client
        .call("tools/call", json!({"name": "missing"}))
        .await
        .unwrap_err();
    assert_eq!(err.code(), INVALID_PARAMS);
}

#[tokio::test]
async fn test_requests_rejected_before_initialization() {
    let server = greeter(ServerOptions::default());
    let (client, session) = raw_client(&server, Vec::new());

    let err = client.call("tools/list", json!({})).await.unwrap_err();
    assert_eq!(err.code(), INVALID_REQUEST);
    client.call("ping", json!({})).await.unwrap();
    assert_eq!(session.state(), SessionState::Pending);
}

#[tokio::test]
async fn test_tools_list_pages() {
    let server = Server::new(
        Implementation::new("pager", "1.0.0"),
        ServerOptions::new().page_size(2),
    );
    server.add_tools(["e", "c", "a", "d", "b"].map(|name| {
        ServerTool::typed(name, "noop", |_ctx, _session, _args: Greet| async move {
            Ok::<_, String>(CallToolResult::text("ok"))
        })
    }));
    let (client, _session) = raw_client(&server, Vec::new());
    client.initialize().await;

    let mut names = Vec::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0;
    loop {
        let params = match &cursor {
            Some(c) => json!({"cursor": c}),
            None => json!({}),
        };
        let page: ListToolsResult =
            serde_json::from_value(client.call("tools/list", params).await.unwrap()).unwrap();
        pages += 1;
        names.extend(page.tools.into_iter().map(|t| t.name));
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }
    assert_eq!(names, vec!["a", "b", "c", "d", "e"]);
    assert_eq!(pages, 3);

    let err = client
        .call("tools/list", json!({"cursor": "not a cursor"}))
        .await
        .unwrap_err();
    assert_eq!(err.code(), INVALID_PARAMS);
}

#[tokio::test]
async fn test_log_respects_level() {
    let server = greeter(ServerOptions::default());
    let (mut client, session) = raw_client(&server, Vec::new());
    client.initialize().await;
    wait_active(&session).await;

    // Nothing is sent before a level is set.
    session
        .log(LoggingMessageParams::new(LoggingLevel::Error, json!("early")))
        .await
        .unwrap();

    client
        .call("logging/setLevel", json!({"level": "warning"}))
        .await
        .unwrap();
    assert_eq!(session.log_level(), Some(LoggingLevel::Warning));

    session
        .log(LoggingMessageParams::new(LoggingLevel::Info, json!("quiet")))
        .await
        .unwrap();
    session
        .log(LoggingMessageParams::new(LoggingLevel::Error, json!("loud")).logger("test"))
        .await
        .unwrap();

    let (method, params) = client.next_notification().await;
    assert_eq!(method, "notifications/message");
    assert_eq!(params["data"], json!("loud"));
    assert_eq!(params["logger"], json!("test"));
}

#[tokio::test]
async fn test_list_changed_reaches_every_session() {
    let server = greeter(ServerOptions::default());
    let (mut first, _s1) = raw_client(&server, Vec::new());
    let (mut second, _s2) = raw_client(&server, Vec::new());
    first.initialize().await;
    second.initialize().await;
    assert_eq!(server.sessions().len(), 2);

    server.remove_tools(["greet"]);
    for client in [&mut first, &mut second] {
        let (method, _) = client.next_notification().await;
        assert_eq!(method, "notifications/tools/list_changed");
    }
    assert_eq!(server.tool_names(), vec!["fail".to_string()]);
}

#[tokio::test]
async fn test_closed_sessions_are_dropped() {
    let server = greeter(ServerOptions::default());
    let (client, session) = raw_client(&server, Vec::new());
    client.initialize().await;
    assert_eq!(server.sessions().len(), 1);

    client.connection.close().await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), session.wait())
        .await
        .unwrap();
    for _ in 0..200 {
        if server.sessions().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(server.sessions().is_empty());
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_read_resource_and_template() {
    let server = greeter(ServerOptions::default());
    server
        .add_resources([ServerResource::new(
            mcpkit_core::types::Resource::new("info://about", "about").mime_type("text/plain"),
            |_ctx, _session, _params| async move {
                Ok(ReadResourceResult::new(vec![ResourceContents::text("", "about us")]))
            },
        )])
        .unwrap();
    server.add_resource_templates([ServerResourceTemplate::new(
        ResourceTemplate::new("users://{id}", "user"),
        |_ctx, _session, params| async move {
            Ok(ReadResourceResult::new(vec![ResourceContents::text(
                params.uri.clone(),
                format!("user at {}", params.uri),
            )]))
        },
    )
    .unwrap()]);
    let (client, _session) = raw_client(&server, Vec::new());
    client.initialize().await;

    let about: ReadResourceResult = serde_json::from_value(
        client
            .call("resources/read", json!({"uri": "info://about"}))
            .await
            .unwrap(),
    )
    .unwrap();
    assert_eq!(about.contents[0].uri, "info://about");
    assert_eq!(about.contents[0].mime_type.as_deref(), Some("text/plain"));

    let user: ReadResourceResult = serde_json::from_value(
        client
            .call("resources/read", json!({"uri": "users://42"}))
            .await
            .unwrap(),
    )
    .unwrap();
    assert_eq!(user.contents[0].as_text(), Some("user at users://42"));

    let err = client
        .call("resources/read", json!({"uri": "nothing://here"}))
        .await
        .unwrap_err();
    assert_eq!(err.code(), RESOURCE_NOT_FOUND);

    assert!(
        server
            .add_resources([ServerResource::new(
                mcpkit_core::types::Resource::new("no scheme", "bad"),
                |_ctx, _session, _params| async move { Ok(ReadResourceResult::default()) },
            )])
            .is_err()
    );
}

#[cfg(unix)]
#[tokio::test]
async fn test_file_resources_follow_client_roots() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("public")).unwrap();
    std::fs::create_dir(dir.path().join("private")).unwrap();
    std::fs::write(dir.path().join("public/hello.txt"), b"hello").unwrap();
    std::fs::write(dir.path().join("private/secret.txt"), b"secret").unwrap();

    let server = greeter(ServerOptions::default());
    server.add_resource_templates([ServerResourceTemplate::with_handler(
        ResourceTemplate::new("file:///{+path}", "files"),
        file_resource_handler(dir.path()).unwrap(),
    )
    .unwrap()]);

    let root = Url::from_directory_path(dir.path().join("public")).unwrap();
    let (client, _session) = raw_client(&server, vec![Root::new(root.to_string())]);
    client.initialize().await;

    let result: ReadResourceResult = serde_json::from_value(
        client
            .call("resources/read", json!({"uri": "file:///public/hello.txt"}))
            .await
            .unwrap(),
    )
    .unwrap();
    assert_eq!(
        result.contents[0].decode_blob().unwrap(),
        Some(b"hello".to_vec())
    );

    let err = client
        .call("resources/read", json!({"uri": "file:///private/secret.txt"}))
        .await
        .unwrap_err();
    assert_eq!(err.code(), INVALID_PARAMS);

    let err = client
        .call("resources/read", json!({"uri": "file:///public/missing.txt"}))
        .await
        .unwrap_err();
    assert_eq!(err.code(), RESOURCE_NOT_FOUND);
}

#[cfg(unix)]
#[tokio::test]
async fn test_file_resources_report_failed_roots_request() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("hello.txt"), b"hello").unwrap();

    let server = greeter(ServerOptions::default());
    server.add_resource_templates([ServerResourceTemplate::with_handler(
        ResourceTemplate::new("file:///{+path}", "files"),
        file_resource_handler(dir.path()).unwrap(),
    )
    .unwrap()]);

    // A client that turns down every request, roots/list included.
    let (a, b) = memory::pair();
    let _session = server.connect(a);
    let connection = Connection::new(b);
    connection.start(Arc::new(|_ctx, method: String, _params: Value| {
        let fut: BoxFuture<'static, Result<Value, McpError>> =
            Box::pin(async move { Err(McpError::method_not_found(method)) });
        fut
    }));
    let client = RawClient {
        connection,
        notifications: mpsc::unbounded_channel().1,
    };
    client.initialize().await;

    let err = client
        .call("resources/read", json!({"uri": "file:///hello.txt"}))
        .await
        .unwrap_err();
    assert_eq!(err.code(), METHOD_NOT_FOUND);
    assert!(
        err.to_string().starts_with("asking the client for its roots: "),
        "{err}"
    );
}

#[tokio::test]
async fn test_initialized_callback_runs_once() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let server = greeter(ServerOptions::new().on_initialized(move |session, _params| {
        let _ = tx.send(session.state());
    }));
    let (client, _session) = raw_client(&server, Vec::new());
    client.initialize().await;
    client
        .connection
        .notify("notifications/initialized", json!({}))
        .await
        .unwrap();

    let state = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state, SessionState::Active);
    client.call("ping", json!({})).await.unwrap();
    assert!(rx.try_recv().is_err());
}

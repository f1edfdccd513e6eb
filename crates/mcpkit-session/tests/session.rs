//! Sessions over an in-memory transport pair.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use mcpkit_core::error::McpError;
use mcpkit_session::{
    Connection, Context, HandlerChain, MethodHandler, MethodInfo, MethodTable, Middleware,
    Session, default_sender, send_notification, send_request, spawn_keepalive,
};
use mcpkit_transport::memory;
use pretty_assertions::assert_eq;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

const SENDABLE: &[&str] = &["ping", "greet", "notifications/poke"];

struct Peer {
    connection: Arc<Connection>,
    sending: Mutex<HandlerChain<Peer>>,
}

impl Session for Peer {
    fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    fn sending_handler(&self) -> MethodHandler<Self> {
        self.sending.lock().unwrap().handler()
    }
}

#[derive(Serialize, Deserialize)]
struct Greeting {
    name: String,
}

fn peer(connection: Arc<Connection>) -> Arc<Peer> {
    Arc::new(Peer {
        connection,
        sending: Mutex::new(HandlerChain::new(default_sender(SENDABLE))),
    })
}

fn serve(connection: &Arc<Connection>, table: MethodTable<()>) {
    let handler = table.into_handler();
    let state = Arc::new(());
    connection.start(Arc::new(move |ctx, method, params| {
        handler(ctx, Arc::clone(&state), method, params)
    }));
}

fn greeter() -> (Arc<Peer>, Arc<Mutex<Vec<String>>>) {
    let (a, b) = memory::pair();
    let pokes = Arc::new(Mutex::new(Vec::new()));
    let table = {
        let pokes = Arc::clone(&pokes);
        MethodTable::<()>::new()
            .with(
                "greet",
                MethodInfo::request(|_ctx, _state, p: Greeting| async move {
                    Ok::<_, McpError>(Greeting {
                        name: format!("hi {}", p.name),
                    })
                }),
            )
            .with(
                "notifications/poke",
                MethodInfo::notification(move |_ctx, _state, p: Value| {
                    let pokes = Arc::clone(&pokes);
                    async move {
                        pokes.lock().unwrap().push(p.to_string());
                        Ok(())
                    }
                }),
            )
    };

    let server = Connection::new(b);
    serve(&server, table);

    let client = Connection::new(a);
    serve(&client, MethodTable::new());
    (peer(client), pokes)
}

#[tokio::test]
async fn typed_requests_go_through_sending_middleware() {
    let (session, pokes) = greeter();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder: Middleware<Peer> = {
        let seen = Arc::clone(&seen);
        Arc::new(move |next: MethodHandler<Peer>| {
            let seen = Arc::clone(&seen);
            let wrapped: MethodHandler<Peer> = Arc::new(move |ctx, session, method, params| {
                seen.lock().unwrap().push(method.clone());
                next(ctx, session, method, params)
            });
            wrapped
        })
    };
    session.sending.lock().unwrap().add(&[recorder]);

    let reply: Greeting = send_request(
        &session,
        &Context::new(),
        "greet",
        &Greeting {
            name: "ada".to_string(),
        },
    )
    .await
    .unwrap();
    assert_eq!(reply.name, "hi ada");

    send_notification(&session, "notifications/poke", &json!({"n": 1}))
        .await
        .unwrap();
    // Notifications are handled in order before any later request.
    let err = send_request::<_, _, Value>(&session, &Context::new(), "ping", &json!({}))
        .await
        .unwrap_err();
    assert_eq!(err.code(), mcpkit_core::error::codes::METHOD_NOT_FOUND);

    assert_eq!(*seen.lock().unwrap(), vec!["greet", "notifications/poke", "ping"]);
    assert_eq!(*pokes.lock().unwrap(), vec![r#"{"n":1}"#.to_string()]);
}

#[tokio::test]
async fn unlisted_methods_are_not_handled() {
    let (session, _) = greeter();

    let err = send_request::<_, _, Value>(&session, &Context::new(), "tools/list", &json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, McpError::NotHandled { .. }), "{err:?}");
}

#[tokio::test]
async fn failed_keepalive_closes_the_session() {
    // The greeter has no ping method, so the first ping fails.
    let (session, _) = greeter();
    let _task = spawn_keepalive(Arc::downgrade(&session), Duration::from_millis(20));

    tokio::time::timeout(Duration::from_secs(5), session.connection().wait())
        .await
        .unwrap();
    assert!(session.connection().is_closed());
}

#[tokio::test]
async fn test_cancelled_request_completes_its_batch() {
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    let (raw, io) = tokio::io::duplex(1 << 16);
    let (io_read, io_write) = tokio::io::split(io);
    let connection = Connection::new(mcpkit_transport::IoTransport::new(io_read, io_write));
    connection.start(Arc::new(|ctx: Context, method: String, params: Value| {
        Box::pin(async move {
            if method == "slow" {
                ctx.cancelled().await;
            }
            Ok(params)
        })
    }));

    let (raw_read, mut raw_write) = tokio::io::split(raw);
    raw_write
        .write_all(
            b"[{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"slow\"},\
              {\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"echo\",\"params\":{\"x\":1}}]\n",
        )
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    raw_write
        .write_all(
            b"{\"jsonrpc\":\"2.0\",\"method\":\"notifications/cancelled\",\"params\":{\"requestId\":1}}\n",
        )
        .await
        .unwrap();

    let mut lines = BufReader::new(raw_read).lines();
    let line = tokio::time::timeout(Duration::from_secs(5), lines.next_line())
        .await
        .expect("batch response was never written")
        .unwrap()
        .unwrap();
    let mut responses: Vec<Value> = serde_json::from_str(&line).unwrap();
    responses.sort_by_key(|r| r["id"].as_i64());

    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0]["id"], json!(1));
    assert_eq!(
        responses[0]["error"]["code"],
        json!(McpError::cancelled("slow").code())
    );
    assert_eq!(responses[1], json!({"jsonrpc": "2.0", "id": 2, "result": {"x": 1}}));
}

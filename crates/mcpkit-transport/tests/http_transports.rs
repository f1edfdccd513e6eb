//! End-to-end tests for the SSE and streamable HTTP transports.
//!
//! Each test serves a handler on an ephemeral local port and connects to it
//! with the matching client transport or with raw HTTP requests.

#![cfg(feature = "http")]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mcpkit_core::protocol::{Message, Notification, Request, RequestId, Response};
use mcpkit_transport::http::{
    HttpClientConfig, HttpServerConfig, MCP_SESSION_ID_HEADER, SseClientTransport, SseParser,
    SseServer, StreamableClientTransport, StreamableHttpServer,
};
use mcpkit_transport::{Transport, with_related_request};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::time::timeout;

const ACCEPT_BOTH: &str = "application/json, text/event-stream";

async fn serve(router: axum::Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
    addr
}

/// Answers every request with its method name. A `notify` request first
/// sends a notification while handling the request.
async fn echo<T: Transport + 'static>(transport: T) {
    let transport = Arc::new(transport);
    while let Ok(Some(msg)) = transport.recv().await {
        let Message::Request(request) = msg else {
            continue;
        };
        let transport = Arc::clone(&transport);
        let id = request.id.clone();
        tokio::spawn(with_related_request(id, async move {
            if request.method == "notify" {
                let note = Notification::with_params("notifications/message", json!({"n": 1}));
                let _ = transport.send(note.into()).await;
            }
            let response = Response::success(request.id.clone(), json!({"method": request.method}));
            let _ = transport.send(response.into()).await;
        }));
    }
}

async fn recv<T: Transport>(transport: &T) -> Message {
    timeout(Duration::from_secs(5), transport.recv())
        .await
        .expect("timed out waiting for a message")
        .unwrap()
        .expect("stream ended")
}

fn events(body: &[u8]) -> Vec<mcpkit_transport::http::SseEvent> {
    SseParser::new(1 << 20).push(body).unwrap()
}

async fn wait_until(mut done: impl FnMut() -> bool) {
    for _ in 0..100 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached");
}

// =============================================================================
// Streamable HTTP
// =============================================================================

#[tokio::test]
async fn test_streamable_request_response() {
    let server = StreamableHttpServer::new(HttpServerConfig::default(), echo);
    let addr = serve(server.router()).await;

    let client =
        StreamableClientTransport::new(HttpClientConfig::new(format!("http://{addr}/mcp"))).unwrap();
    client.send(Request::new("ping", 1).into()).await.unwrap();

    let Message::Response(response) = recv(&client).await else {
        panic!("expected a response");
    };
    assert_eq!(response.id, RequestId::from(1));
    assert_eq!(response.result, Some(json!({"method": "ping"})));

    let session_id = client.session_id().unwrap();
    assert_eq!(server.session_ids(), vec![session_id]);

    client.close().await.unwrap();
    wait_until(|| server.session_ids().is_empty()).await;
}

#[tokio::test]
async fn test_streamable_related_traffic_precedes_response() {
    let server = StreamableHttpServer::new(HttpServerConfig::default(), echo);
    let addr = serve(server.router()).await;

    let client =
        StreamableClientTransport::new(HttpClientConfig::new(format!("http://{addr}/mcp"))).unwrap();
    client.send(Request::new("notify", 7).into()).await.unwrap();

    let first = recv(&client).await;
    assert_eq!(first.method(), Some("notifications/message"));
    let second = recv(&client).await;
    assert_eq!(second.id(), Some(&RequestId::from(7)));
}

#[tokio::test]
async fn test_streamable_notification_only_post_is_accepted() {
    let server = StreamableHttpServer::new(HttpServerConfig::default(), echo);
    let addr = serve(server.router()).await;
    let http = reqwest::Client::new();

    let response = http
        .post(format!("http://{addr}/mcp"))
        .header("accept", ACCEPT_BOTH)
        .header("content-type", "application/json")
        .body(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::ACCEPTED);
    assert!(response.headers().contains_key(MCP_SESSION_ID_HEADER));
}

#[tokio::test]
async fn test_streamable_status_codes() {
    let server = StreamableHttpServer::new(HttpServerConfig::default(), echo);
    let addr = serve(server.router()).await;
    let url = format!("http://{addr}/mcp");
    let http = reqwest::Client::new();
    let ping = r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#;

    let missing_accept = http
        .post(&url)
        .header("accept", "application/json")
        .body(ping)
        .send()
        .await
        .unwrap();
    assert_eq!(missing_accept.status(), reqwest::StatusCode::BAD_REQUEST);

    let unknown_session = http
        .post(&url)
        .header("accept", ACCEPT_BOTH)
        .header(MCP_SESSION_ID_HEADER, "nope")
        .body(ping)
        .send()
        .await
        .unwrap();
    assert_eq!(unknown_session.status(), reqwest::StatusCode::NOT_FOUND);

    let bad_body = http
        .post(&url)
        .header("accept", ACCEPT_BOTH)
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(bad_body.status(), reqwest::StatusCode::BAD_REQUEST);
    assert!(!bad_body.headers().contains_key(MCP_SESSION_ID_HEADER));

    let empty_batch = http
        .post(&url)
        .header("accept", ACCEPT_BOTH)
        .body("[]")
        .send()
        .await
        .unwrap();
    assert_eq!(empty_batch.status(), reqwest::StatusCode::BAD_REQUEST);

    let duplicate_ids = http
        .post(&url)
        .header("accept", ACCEPT_BOTH)
        .body(format!("[{ping},{ping}]"))
        .send()
        .await
        .unwrap();
    assert_eq!(duplicate_ids.status(), reqwest::StatusCode::BAD_REQUEST);

    // Rejected POSTs must not leave sessions behind.
    assert!(server.session_ids().is_empty());

    let get_without_session = http
        .get(&url)
        .header("accept", "text/event-stream")
        .send()
        .await
        .unwrap();
    assert_eq!(get_without_session.status(), reqwest::StatusCode::BAD_REQUEST);

    let delete_unknown = http
        .delete(&url)
        .header(MCP_SESSION_ID_HEADER, "nope")
        .send()
        .await
        .unwrap();
    assert_eq!(delete_unknown.status(), reqwest::StatusCode::NOT_FOUND);

    let put = http.put(&url).send().await.unwrap();
    assert_eq!(put.status(), reqwest::StatusCode::METHOD_NOT_ALLOWED);
    let allow = put.headers()[reqwest::header::ALLOW].to_str().unwrap();
    assert!(allow.contains("GET") && allow.contains("POST"));
    assert!(server.session_ids().is_empty());
}

#[tokio::test]
async fn test_streamable_errors_name_the_session() {
    let server = StreamableHttpServer::new(HttpServerConfig::default(), echo);
    let addr = serve(server.router()).await;
    let url = format!("http://{addr}/mcp");
    let http = reqwest::Client::new();

    let opened = http
        .post(&url)
        .header("accept", ACCEPT_BOTH)
        .body(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
        .send()
        .await
        .unwrap();
    let session_id = opened.headers()[MCP_SESSION_ID_HEADER]
        .to_str()
        .unwrap()
        .to_string();

    let put = http
        .put(&url)
        .header(MCP_SESSION_ID_HEADER, &session_id)
        .send()
        .await
        .unwrap();
    assert_eq!(put.status(), reqwest::StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(put.headers()[MCP_SESSION_ID_HEADER], session_id.as_str());

    let bad_body = http
        .post(&url)
        .header("accept", ACCEPT_BOTH)
        .header(MCP_SESSION_ID_HEADER, &session_id)
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(bad_body.status(), reqwest::StatusCode::BAD_REQUEST);
    assert_eq!(bad_body.headers()[MCP_SESSION_ID_HEADER], session_id.as_str());

    let missing_accept = http
        .get(&url)
        .header("accept", "application/json")
        .header(MCP_SESSION_ID_HEADER, &session_id)
        .send()
        .await
        .unwrap();
    assert_eq!(missing_accept.status(), reqwest::StatusCode::BAD_REQUEST);
    assert_eq!(missing_accept.headers()[MCP_SESSION_ID_HEADER], session_id.as_str());

    assert_eq!(server.session_ids(), vec![session_id]);
}

#[tokio::test]
async fn test_streamable_resume_with_last_event_id() {
    let server = StreamableHttpServer::new(HttpServerConfig::default(), echo);
    let addr = serve(server.router()).await;
    let url = format!("http://{addr}/mcp");
    let http = reqwest::Client::new();

    let response = http
        .post(&url)
        .header("accept", ACCEPT_BOTH)
        .header("content-type", "application/json")
        .body(r#"{"jsonrpc":"2.0","id":1,"method":"notify"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let session_id = response.headers()[MCP_SESSION_ID_HEADER]
        .to_str()
        .unwrap()
        .to_string();

    // The stream ends once the response has been delivered.
    let delivered = events(&response.bytes().await.unwrap());
    let ids: Vec<_> = delivered.iter().map(|e| e.id.clone().unwrap()).collect();
    assert_eq!(ids, vec!["1_0", "1_1"]);

    let resumed = http
        .get(&url)
        .header("accept", "text/event-stream")
        .header(MCP_SESSION_ID_HEADER, &session_id)
        .header("last-event-id", "1_0")
        .send()
        .await
        .unwrap();
    assert_eq!(resumed.status(), reqwest::StatusCode::OK);
    let replayed = events(&resumed.bytes().await.unwrap());
    assert_eq!(replayed.len(), 1);
    assert_eq!(replayed[0].id.as_deref(), Some("1_1"));
    assert!(replayed[0].data.contains("\"id\":1"));

    for bad in ["garbage", "9_0"] {
        let rejected = http
            .get(&url)
            .header("accept", "text/event-stream")
            .header(MCP_SESSION_ID_HEADER, &session_id)
            .header("last-event-id", bad)
            .send()
            .await
            .unwrap();
        assert_eq!(rejected.status(), reqwest::StatusCode::BAD_REQUEST);
    }

    let deleted = http
        .delete(&url)
        .header(MCP_SESSION_ID_HEADER, &session_id)
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status(), reqwest::StatusCode::NO_CONTENT);
    wait_until(|| server.session_ids().is_empty()).await;
}

// =============================================================================
// SSE
// =============================================================================

#[tokio::test]
async fn test_sse_round_trip() {
    let server = SseServer::new(HttpServerConfig::new("/sse"), echo);
    let addr = serve(server.router()).await;

    let client = SseClientTransport::connect(HttpClientConfig::new(format!("http://{addr}/sse")))
        .await
        .unwrap();
    assert_eq!(client.endpoint().path(), "/sse");
    assert_eq!(server.session_ids().len(), 1);

    client.send(Request::new("notify", 3).into()).await.unwrap();
    assert_eq!(recv(&client).await.method(), Some("notifications/message"));
    assert_eq!(recv(&client).await.id(), Some(&RequestId::from(3)));

    client.close().await.unwrap();
    assert!(!client.is_connected());
    assert!(client.send(Request::new("ping", 4).into()).await.is_err());
}

#[tokio::test]
async fn test_sse_post_status_codes() {
    let server = SseServer::new(HttpServerConfig::new("/sse"), echo);
    let addr = serve(server.router()).await;
    let http = reqwest::Client::new();
    let ping = r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#;

    let missing = http
        .post(format!("http://{addr}/sse"))
        .body(ping)
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), reqwest::StatusCode::BAD_REQUEST);

    let unknown = http
        .post(format!("http://{addr}/sse?sessionid=nope"))
        .body(ping)
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), reqwest::StatusCode::NOT_FOUND);

    let wrong_accept = http
        .get(format!("http://{addr}/sse"))
        .header("accept", "application/json")
        .send()
        .await
        .unwrap();
    assert_eq!(wrong_accept.status(), reqwest::StatusCode::BAD_REQUEST);
}

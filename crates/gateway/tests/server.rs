#![allow(clippy::unwrap_used, clippy::expect_used)]
//! HTTP and WebSocket surface tests against a live listener.

use std::{net::SocketAddr, time::Duration};

use {
    futures::{SinkExt, StreamExt},
    switchyard_config::SwitchyardConfig,
    switchyard_gateway::{AppState, Mesh, bind, build_gateway_app, serve},
    switchyard_metrics::MetricsHandle,
    tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message},
    tokio_util::sync::CancellationToken,
};

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

struct TestServer {
    addr: SocketAddr,
    mesh: Mesh,
    shutdown: CancellationToken,
}

impl TestServer {
    async fn stop(self) {
        self.shutdown.cancel();
        self.mesh.shutdown().await;
    }
}

async fn start_test_server(config: SwitchyardConfig) -> TestServer {
    let max_frame_bytes = config.gateway.max_frame_bytes;
    let mesh = Mesh::builder(config).start().await.unwrap();
    let app = build_gateway_app(AppState {
        gateway: mesh.gateway().clone(),
        registry: mesh.registry().clone(),
        metrics: MetricsHandle::noop(),
        max_frame_bytes,
    });

    let listener = bind("127.0.0.1", 0).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    tokio::spawn(serve(listener, app, shutdown.clone()));
    TestServer {
        addr,
        mesh,
        shutdown,
    }
}

async fn next_json(ws: &mut Socket) -> serde_json::Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn send_json(ws: &mut Socket, frame: serde_json::Value) {
    ws.send(Message::Text(frame.to_string().into())).await.unwrap();
}

async fn connect(addr: SocketAddr) -> Socket {
    let (mut ws, _) = connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("ws connect failed");
    let connected = next_json(&mut ws).await;
    assert_eq!(connected["type"], "event");
    assert_eq!(connected["event"], "connected");
    assert_eq!(connected["payload"]["protocol"], 1);
    ws
}

// ── HTTP ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn health_endpoint_returns_json() {
    let server = start_test_server(SwitchyardConfig::default()).await;

    let resp = reqwest::get(format!("http://{}/api/health", server.addr))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["pending"], 0);
    assert_eq!(json["connections"], 0);
    server.stop().await;
}

#[tokio::test]
async fn chat_endpoint_returns_the_resolved_response() {
    let server = start_test_server(SwitchyardConfig::default()).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{}/api/chat", server.addr))
        .json(&serde_json::json!({
            "message": "Where is my order ORD-12345678?",
            "customerIdentity": "john.doe@example.com",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["resolutionStatus"], "resolved");
    assert_eq!(json["trace"][0], "classification-stage");
    assert!(json["sessionId"].as_str().is_some_and(|s| !s.is_empty()));
    assert!(json["responseText"].as_str().unwrap().contains("ORD-12345678"));
    server.stop().await;
}

#[tokio::test]
async fn chat_endpoint_rejects_an_empty_message() {
    let server = start_test_server(SwitchyardConfig::default()).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{}/api/chat", server.addr))
        .json(&serde_json::json!({ "message": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["code"], "INVALID_REQUEST");
    server.stop().await;
}

#[tokio::test]
async fn chat_endpoint_times_out_with_504() {
    let mut config = SwitchyardConfig::default();
    config.gateway.request_timeout_ms = 200;
    config.pipeline.steps = vec!["nowhere".into()];
    let server = start_test_server(config).await;

    let resp = reqwest::Client::new()
        .post(format!("http://{}/api/chat", server.addr))
        .json(&serde_json::json!({ "message": "hello", "customerIdentity": "c" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 504);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["resolutionStatus"], "timed_out");
    assert!(json["elapsedMs"].as_u64().unwrap() >= 200);
    assert_eq!(server.mesh.gateway().pending(), 0);
    server.stop().await;
}

// ── WebSocket ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn ws_ping_answers_pong() {
    let server = start_test_server(SwitchyardConfig::default()).await;
    let mut ws = connect(server.addr).await;

    send_json(
        &mut ws,
        serde_json::json!({ "type": "req", "id": "p1", "method": "ping" }),
    )
    .await;
    let res = next_json(&mut ws).await;
    assert_eq!(res["type"], "res");
    assert_eq!(res["id"], "p1");
    assert_eq!(res["ok"], true);
    assert_eq!(res["payload"]["pong"], true);

    ws.close(None).await.unwrap();
    server.stop().await;
}

#[tokio::test]
async fn ws_submit_acks_then_pushes_the_response() {
    let server = start_test_server(SwitchyardConfig::default()).await;
    let mut ws = connect(server.addr).await;

    send_json(
        &mut ws,
        serde_json::json!({
            "type": "req",
            "id": "r1",
            "method": "submit",
            "params": {
                "message": "Where is my order ORD-12345678?",
                "customerIdentity": "john.doe@example.com",
                "sessionId": "ws-session",
            },
        }),
    )
    .await;

    let mut ack = None;
    let mut pushed = None;
    while ack.is_none() || pushed.is_none() {
        let frame = next_json(&mut ws).await;
        match frame["type"].as_str() {
            Some("res") => ack = Some(frame),
            Some("event") if frame["event"] == "chat.response" => pushed = Some(frame),
            _ => {},
        }
    }
    let ack = ack.unwrap();
    let pushed = pushed.unwrap();

    assert_eq!(ack["ok"], true);
    assert_eq!(ack["payload"]["sessionId"], "ws-session");
    assert_eq!(pushed["payload"]["requestId"], "r1");
    assert_eq!(pushed["payload"]["messageId"], ack["payload"]["messageId"]);
    assert_eq!(pushed["payload"]["response"]["resolutionStatus"], "resolved");

    ws.close(None).await.unwrap();
    server.stop().await;
}

#[tokio::test]
async fn ws_rejects_unknown_methods_and_bad_params() {
    let server = start_test_server(SwitchyardConfig::default()).await;
    let mut ws = connect(server.addr).await;

    send_json(
        &mut ws,
        serde_json::json!({ "type": "req", "id": "u1", "method": "shutdown" }),
    )
    .await;
    let res = next_json(&mut ws).await;
    assert_eq!(res["ok"], false);
    assert_eq!(res["error"]["code"], "UNKNOWN_METHOD");

    send_json(
        &mut ws,
        serde_json::json!({ "type": "req", "id": "s1", "method": "submit", "params": {} }),
    )
    .await;
    let res = next_json(&mut ws).await;
    assert_eq!(res["id"], "s1");
    assert_eq!(res["error"]["code"], "INVALID_REQUEST");

    ws.send(Message::Text("not json".into())).await.unwrap();
    let event = next_json(&mut ws).await;
    assert_eq!(event["event"], "error");
    assert_eq!(event["payload"]["code"], "INVALID_REQUEST");

    ws.close(None).await.unwrap();
    server.stop().await;
}

#[tokio::test]
async fn ws_oversized_frame_is_refused_without_closing() {
    let mut config = SwitchyardConfig::default();
    config.gateway.max_frame_bytes = 256;
    let server = start_test_server(config).await;
    let mut ws = connect(server.addr).await;

    ws.send(Message::Text("x".repeat(300).into())).await.unwrap();
    let event = next_json(&mut ws).await;
    assert_eq!(event["event"], "error");
    assert_eq!(event["payload"]["code"], "FRAME_TOO_LARGE");

    // Still usable afterwards.
    send_json(
        &mut ws,
        serde_json::json!({ "type": "req", "id": "p2", "method": "ping" }),
    )
    .await;
    let res = next_json(&mut ws).await;
    assert_eq!(res["id"], "p2");

    ws.close(None).await.unwrap();
    server.stop().await;
}

#[tokio::test]
async fn ws_disconnect_unregisters_the_connection() {
    let server = start_test_server(SwitchyardConfig::default()).await;
    let ws = connect(server.addr).await;
    assert_eq!(server.mesh.registry().len(), 1);

    drop(ws);
    for _ in 0..200 {
        if server.mesh.registry().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(server.mesh.registry().is_empty());
    server.stop().await;
}

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::time;
use tokio_tungstenite::{tungstenite, MaybeTlsStream, WebSocketStream};

use parley_gateway::config::{Config, DirectoryBackend};
use parley_gateway::directory::memory::{MemoryGroupDirectory, MemoryIdentityDirectory};
use parley_gateway::AppState;

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long a read may take before the test fails.
const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// App state over in-memory directories the test can poke at directly.
pub struct TestContext {
    pub state: AppState,
    pub identities: Arc<MemoryIdentityDirectory>,
    pub groups: Arc<MemoryGroupDirectory>,
}

pub fn test_config() -> Config {
    Config {
        port: 0,
        directory: DirectoryBackend::Memory,
        directory_timeout: Duration::from_millis(500),
        heartbeat_interval_ms: 41_250,
    }
}

pub fn test_state() -> TestContext {
    test_state_with(test_config())
}

pub fn test_state_with(config: Config) -> TestContext {
    let identities = Arc::new(MemoryIdentityDirectory::new());
    let groups = Arc::new(MemoryGroupDirectory::new());
    let state = AppState::new(config, identities.clone(), groups.clone());
    TestContext {
        state,
        identities,
        groups,
    }
}

pub fn test_app() -> (Router, TestContext) {
    test_app_with(test_config())
}

pub fn test_app_with(config: Config) -> (Router, TestContext) {
    let ctx = test_state_with(config);
    let app = parley_gateway::routes::router().with_state(ctx.state.clone());
    (app, ctx)
}

/// Start an actual TCP server for WebSocket testing. The server runs in the
/// background for the rest of the test.
pub async fn start_ws_server() -> (SocketAddr, TestContext) {
    start_ws_server_with(test_config()).await
}

pub async fn start_ws_server_with(config: Config) -> (SocketAddr, TestContext) {
    let (app, ctx) = test_app_with(config);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, ctx)
}

/// Connect to the gateway and consume HELLO. Returns the socket and the
/// connection id the gateway assigned.
pub async fn connect(addr: SocketAddr) -> (WsClient, String) {
    let url = format!("ws://{addr}/gateway");
    let (mut ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("ws connect");

    let hello = next_json(&mut ws).await;
    assert_eq!(hello["op"], 10, "first frame should be HELLO");
    assert!(hello["d"]["heartbeat_interval"].as_u64().unwrap() > 0);
    let connection_id = hello["d"]["connection_id"].as_str().unwrap().to_string();
    (ws, connection_id)
}

pub async fn send_op(ws: &mut WsClient, op: u8, d: Value) {
    let frame = serde_json::json!({ "op": op, "d": d });
    ws.send(tungstenite::Message::Text(frame.to_string().into()))
        .await
        .expect("send frame");
}

/// Next raw frame, failing the test after `READ_TIMEOUT`.
pub async fn next_frame(ws: &mut WsClient) -> tungstenite::Message {
    time::timeout(READ_TIMEOUT, ws.next())
        .await
        .expect("timeout waiting for frame")
        .expect("stream ended")
        .expect("ws read error")
}

pub async fn next_json(ws: &mut WsClient) -> Value {
    let msg = next_frame(ws).await;
    let text = msg.into_text().expect("not text");
    serde_json::from_str(&text).expect("parse frame")
}

/// Skip frames until a dispatch named `name` arrives.
pub async fn next_dispatch(ws: &mut WsClient, name: &str) -> Value {
    loop {
        let frame = next_json(ws).await;
        if frame["op"] == 0 && frame["t"] == name {
            return frame;
        }
    }
}

/// Assert nothing arrives on `ws` for a short while.
pub async fn expect_silence(ws: &mut WsClient) {
    if let Ok(Some(Ok(msg))) = time::timeout(Duration::from_millis(300), ws.next()).await {
        panic!("expected no frames, got: {msg:?}");
    }
}

/// Discard frames until the socket has been quiet for a short while.
pub async fn drain(ws: &mut WsClient) {
    while let Ok(Some(Ok(_))) = time::timeout(Duration::from_millis(200), ws.next()).await {}
}

/// Register `name` and consume the confirmation and first snapshot.
/// Returns the assigned identity id.
pub async fn register(ws: &mut WsClient, name: &str) -> String {
    register_with(ws, serde_json::json!({ "display_name": name })).await
}

pub async fn register_with(ws: &mut WsClient, payload: Value) -> String {
    send_op(ws, 2, payload).await;
    let confirmed = next_dispatch(ws, "REGISTRATION_CONFIRMED").await;
    next_dispatch(ws, "LIST_SNAPSHOT").await;
    confirmed["d"]["id"].as_str().unwrap().to_string()
}

/// Assert the socket was closed with `code`.
pub async fn expect_close(ws: &mut WsClient, code: u16) {
    match next_frame(ws).await {
        tungstenite::Message::Close(Some(frame)) => {
            assert_eq!(
                frame.code,
                tungstenite::protocol::frame::coding::CloseCode::from(code)
            );
        }
        tungstenite::Message::Close(None) => {}
        other => panic!("Expected Close frame, got: {other:?}"),
    }
}

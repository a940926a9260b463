//! WebSocket upgrade handler and per-connection event loop.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parley_common::{ConnectionId, PrefixedId};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time;

use crate::error::GatewayError;
use crate::AppState;

use super::events::{
    ClientMessage, CreateGroupPayload, Event, GatewayMessage, HeartbeatPayload, RegisterPayload,
    SendDirectPayload, SendGroupPayload, OP_CREATE_GROUP, OP_HEARTBEAT, OP_REGISTER,
    OP_SEND_DIRECT, OP_SEND_GROUP,
};
use super::fanout::ConnectionHandle;
use super::handler::{handle_create_group, handle_register, mark_online};
use super::hub::Hub;
use super::session::GatewaySession;

/// Close codes (4000-range for application-level).
const CLOSE_UNKNOWN_ERROR: u16 = 4000;
const CLOSE_UNKNOWN_OPCODE: u16 = 4001;
const CLOSE_SESSION_TIMEOUT: u16 = 4009;

type WsSink = SplitSink<WebSocket, Message>;
type WsStream = SplitStream<WebSocket>;

pub fn router() -> Router<AppState> {
    Router::new().route("/gateway", get(ws_upgrade))
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    let (mut ws_tx, ws_rx) = socket.split();
    let heartbeat_interval_ms = state.config.heartbeat_interval_ms;
    let session = Arc::new(GatewaySession::new(ConnectionId::generate()));

    let hello = GatewayMessage::hello(&session.connection_id, heartbeat_interval_ms);
    if send_json(&mut ws_tx, &hello).await.is_err() {
        return;
    }
    tracing::info!(connection_id = %session.connection_id, "gateway connection opened");

    let (handle, outbound_rx) = ConnectionHandle::new(session.connection_id.clone());
    let connection = Connection {
        hub: state.hub.clone(),
        session: session.clone(),
        handle,
        tasks: JoinSet::new(),
    };
    connection
        .run(ws_tx, ws_rx, outbound_rx, heartbeat_interval_ms)
        .await;

    // Closing and unbinding happen under the session lock, so an in-flight
    // registration can't install a binding after this point.
    let released = session.close(|| state.hub.sessions.unbind(&session.connection_id));
    match released {
        Some(released) => {
            tracing::info!(
                connection_id = %session.connection_id,
                identity_id = %released.identity.identity_id,
                was_current = released.was_current,
                "gateway connection closed"
            );
            if released.was_current {
                mark_online(&state.hub, &released.identity.identity_id, false).await;
            }
        }
        None => {
            tracing::info!(
                connection_id = %session.connection_id,
                "gateway connection closed unbound"
            );
        }
    }
}

/// Everything one connection's event loop owns.
struct Connection {
    hub: Arc<Hub>,
    session: Arc<GatewaySession>,
    handle: ConnectionHandle,
    /// Directory-bound requests in flight for this connection.
    tasks: JoinSet<()>,
}

/// What the loop should do after handling one client frame.
enum Flow {
    Continue,
    Close(u16, &'static str),
}

impl Connection {
    /// Read client frames, drain the outbound queue, enforce the heartbeat.
    async fn run(
        mut self,
        mut ws_tx: WsSink,
        mut ws_rx: WsStream,
        mut outbound_rx: mpsc::UnboundedReceiver<Event>,
        heartbeat_interval_ms: u64,
    ) {
        // Heartbeat deadline: client must heartbeat within 1.5× the interval.
        let mut heartbeat_timer = time::interval(heartbeat_deadline(heartbeat_interval_ms));
        heartbeat_timer.tick().await; // First tick fires immediately; skip it.
        let mut got_heartbeat = true;

        loop {
            tokio::select! {
                msg = ws_rx.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            let client_msg: ClientMessage = match serde_json::from_str(&text) {
                                Ok(m) => m,
                                Err(_) => {
                                    let _ = send_close(
                                        &mut ws_tx,
                                        CLOSE_UNKNOWN_ERROR,
                                        "Invalid JSON",
                                    )
                                    .await;
                                    break;
                                }
                            };

                            if client_msg.op == OP_HEARTBEAT {
                                got_heartbeat = true;
                                let payload: HeartbeatPayload = serde_json::from_value(client_msg.d)
                                    .unwrap_or(HeartbeatPayload { seq: 0 });
                                let ack = GatewayMessage::heartbeat_ack(payload.seq);
                                if send_json(&mut ws_tx, &ack).await.is_err() {
                                    break;
                                }
                                continue;
                            }

                            if let Flow::Close(code, reason) = self.dispatch(client_msg) {
                                let _ = send_close(&mut ws_tx, code, reason).await;
                                break;
                            }
                        }
                        Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Err(e)) => {
                            tracing::debug!(
                                ?e,
                                connection_id = %self.session.connection_id,
                                "ws read error"
                            );
                            break;
                        }
                        _ => continue,
                    }
                }

                // Events queued for this connection by routing, sync and its own requests.
                Some(event) = outbound_rx.recv() => {
                    let seq = self.session.next_seq();
                    if send_json(&mut ws_tx, &event.into_dispatch(seq)).await.is_err() {
                        break;
                    }
                }

                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            tracing::error!(
                                connection_id = %self.session.connection_id,
                                "request task panicked"
                            );
                        }
                    }
                }

                _ = heartbeat_timer.tick() => {
                    if !got_heartbeat {
                        tracing::debug!(
                            connection_id = %self.session.connection_id,
                            "heartbeat timeout, closing connection"
                        );
                        let _ = send_close(&mut ws_tx, CLOSE_SESSION_TIMEOUT, "Heartbeat timeout")
                            .await;
                        break;
                    }
                    got_heartbeat = false;
                }
            }
        }

        self.tasks.abort_all();
    }

    /// Handle one non-heartbeat opcode.
    ///
    /// Sends are routed inline. Register and create-group suspend on the
    /// directories, so they run as tasks and the loop keeps serving frames.
    fn dispatch(&mut self, msg: ClientMessage) -> Flow {
        match msg.op {
            OP_REGISTER => match parse::<RegisterPayload>(msg.d) {
                Ok(payload) => {
                    let (hub, session, handle) = self.parts();
                    self.tasks.spawn(async move {
                        if let Err(err) = handle_register(&hub, &session, &handle, payload).await {
                            reject(&handle, OP_REGISTER, &err);
                        }
                    });
                }
                Err(err) => reject(&self.handle, OP_REGISTER, &err),
            },
            OP_CREATE_GROUP => match parse::<CreateGroupPayload>(msg.d) {
                Ok(payload) => {
                    let (hub, session, handle) = self.parts();
                    self.tasks.spawn(async move {
                        if let Err(err) = handle_create_group(&hub, &session, payload).await {
                            reject(&handle, OP_CREATE_GROUP, &err);
                        }
                    });
                }
                Err(err) => reject(&self.handle, OP_CREATE_GROUP, &err),
            },
            OP_SEND_DIRECT => {
                let result = parse::<SendDirectPayload>(msg.d).and_then(|p| {
                    self.session.ensure_bound()?;
                    self.hub.send_direct(&self.session.connection_id, &p.to, p.body)
                });
                if let Err(err) = result {
                    reject(&self.handle, OP_SEND_DIRECT, &err);
                }
            }
            OP_SEND_GROUP => {
                let result = parse::<SendGroupPayload>(msg.d).and_then(|p| {
                    self.session.ensure_bound()?;
                    self.hub.send_group(&self.session.connection_id, &p.group_id, p.body)
                });
                if let Err(err) = result {
                    reject(&self.handle, OP_SEND_GROUP, &err);
                }
            }
            _ => return Flow::Close(CLOSE_UNKNOWN_OPCODE, "Unknown opcode"),
        }
        Flow::Continue
    }

    fn parts(&self) -> (Arc<Hub>, Arc<GatewaySession>, ConnectionHandle) {
        (self.hub.clone(), self.session.clone(), self.handle.clone())
    }
}

/// 1.5× the advertised interval, never zero.
fn heartbeat_deadline(interval_ms: u64) -> Duration {
    Duration::from_millis((interval_ms.saturating_mul(3) / 2).max(1))
}

fn parse<T: DeserializeOwned>(data: Value) -> Result<T, GatewayError> {
    serde_json::from_value(data).map_err(|e| GatewayError::invalid(e.to_string()))
}

/// Report a failed request on its own connection. `Forbidden` stays silent.
fn reject(handle: &ConnectionHandle, op: u8, err: &GatewayError) {
    match err {
        GatewayError::Forbidden(_) => return,
        GatewayError::DirectoryUnavailable(_) => {
            tracing::warn!(connection_id = %handle.id(), op, error = %err, "request failed");
        }
        _ => {
            tracing::debug!(
                connection_id = %handle.id(),
                op,
                code = err.code(),
                "request rejected"
            );
        }
    }
    handle.deliver(Event::rejected(op, err));
}

async fn send_json(ws_tx: &mut WsSink, msg: &GatewayMessage) -> Result<(), axum::Error> {
    let json = serde_json::to_string(msg).map_err(axum::Error::new)?;
    ws_tx.send(Message::Text(json.into())).await
}

/// Send a WebSocket close frame with a code and reason.
async fn send_close(ws_tx: &mut WsSink, code: u16, reason: &str) -> Result<(), axum::Error> {
    let close_msg = Message::Close(Some(axum::extract::ws::CloseFrame {
        code,
        reason: reason.to_string().into(),
    }));
    ws_tx.send(close_msg).await
}

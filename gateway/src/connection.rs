//! Connection lifecycle: hello frame, auth, recv loop, and the outbound
//! routing table that implements the core's [`ChannelSink`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use axum::extract::ws::{Message, WebSocket};
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use noctua::ChannelSink;
use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use wire::{GatewayMessage, MessageType};

use crate::app::AppState;
use crate::dispatch;

/// Bounded outbound buffer per adapter. Non-critical events are dropped
/// when an adapter cannot keep up; approvals and replies are spawned so
/// they wait for space instead.
const OUTBOUND_BUFFER: usize = 128;

pub(crate) struct ConnectionHandle {
    pub(crate) client_id: String,
    /// Channel tag this adapter claims; learned from its inbound frames.
    pub(crate) channel: RwLock<String>,
    pub(crate) tx: mpsc::Sender<GatewayMessage>,
    pub(crate) authed: AtomicBool,
}

impl ConnectionHandle {
    fn claims(&self, channel: &str) -> bool {
        !channel.is_empty() && *self.channel.read().expect("channel lock") == channel
    }
}

#[derive(Default)]
pub(crate) struct ConnectionTable {
    map: DashMap<String, Arc<ConnectionHandle>>,
}

impl ConnectionTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, handle: Arc<ConnectionHandle>) {
        self.map.insert(handle.client_id.clone(), handle);
    }

    pub(crate) fn remove(&self, client_id: &str) {
        self.map.remove(client_id);
    }

    fn deliver(&self, handle: &Arc<ConnectionHandle>, message: GatewayMessage) {
        let critical = matches!(
            message.message_type,
            MessageType::ApprovalRequest | MessageType::Response | MessageType::Error
        );
        if critical {
            // Approvals and replies must not be dropped; wait for buffer
            // space off the caller's thread.
            let tx = handle.tx.clone();
            tokio::spawn(async move {
                let _ = tx.send(message).await;
            });
        } else if let Err(e) = handle.tx.try_send(message) {
            tracing::debug!("adapter send buffer full, dropping event: {}", e);
        }
    }
}

impl ChannelSink for ConnectionTable {
    fn send_to_channel(&self, channel: &str, message: GatewayMessage) {
        let mut delivered = false;
        for entry in self.map.iter() {
            if entry.value().claims(channel) {
                self.deliver(entry.value(), message.clone());
                delivered = true;
            }
        }
        if !delivered {
            tracing::debug!(channel = %channel, "no adapter claims channel, dropping frame");
        }
    }

    fn broadcast(&self, message: GatewayMessage) {
        for entry in self.map.iter() {
            self.deliver(entry.value(), message.clone());
        }
    }
}

pub(crate) async fn handle_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
) {
    let client_id = uuid::Uuid::new_v4().to_string();
    let (mut ws_tx, mut ws_rx) = socket.split();

    let (out_tx, mut out_rx) = mpsc::channel::<GatewayMessage>(OUTBOUND_BUFFER);
    let handle = Arc::new(ConnectionHandle {
        client_id: client_id.clone(),
        channel: RwLock::new(String::new()),
        tx: out_tx,
        authed: AtomicBool::new(state.runtime.config.gateway_token.is_none()),
    });
    state.connections.insert(Arc::clone(&handle));

    // Hello: the first frame after connect is always a status carrying the
    // allocated client id.
    let mut hello = serde_json::Map::new();
    hello.insert("client_id".to_string(), json!(client_id));
    hello.insert("server".to_string(), json!("noctua"));
    let _ = handle.tx.send(wire::status(hello)).await;

    // Writer: drains the outbound buffer until the connection drops.
    let writer = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            let Ok(text) = message.to_json() else { continue };
            if ws_tx.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(received) = ws_rx.next().await {
        let frame = match received {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(client = %client_id, "read error (client closed?): {}", e);
                break;
            }
        };
        let text = match frame {
            Message::Text(t) => t,
            Message::Binary(b) => String::from_utf8_lossy(&b).into_owned(),
            Message::Close(_) => break,
            _ => continue,
        };

        // Malformed JSON is logged and ignored; the connection stays up.
        let message = match GatewayMessage::from_json(&text) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(client = %client_id, "ignoring malformed frame: {}", e);
                continue;
            }
        };

        if !handle.authed.load(Ordering::SeqCst) {
            if authenticate(&state, &handle, &message) {
                continue;
            }
            tracing::warn!(client = %client_id, "rejecting unauthenticated connection");
            let _ = handle
                .tx
                .send(wire::error_to(&message, "authentication required"))
                .await;
            break;
        }

        // Directionality: gateway-to-adapter types from an adapter are
        // ignored.
        if !message.message_type.inbound() {
            tracing::debug!(client = %client_id, "ignoring outbound-typed frame from adapter");
            continue;
        }

        if !message.channel.is_empty() {
            *handle.channel.write().expect("channel lock") = message.channel.clone();
        }

        dispatch::handle_inbound(&state, &handle, message).await;
    }

    // Pending approvals for this client stay queued: a reconnecting
    // adapter can re-adopt them by session id, or they time out.
    state.connections.remove(&client_id);
    // Let the writer flush queued frames (a rejection error, a final
    // reply); it exits once every sender is gone.
    drop(handle);
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), writer).await;
    tracing::info!(client = %client_id, "adapter disconnected");

    if let Some(tx) = shutdown_tx {
        let _ = tx.send(());
    }
}

/// First-frame auth when a gateway token is configured. Returns true when
/// the frame was a valid `auth` command.
fn authenticate(state: &Arc<AppState>, handle: &Arc<ConnectionHandle>, message: &GatewayMessage) -> bool {
    let Some(expected) = &state.runtime.config.gateway_token else {
        return true;
    };
    if message.message_type != MessageType::Command || message.data_str("command") != "auth" {
        return false;
    }
    let presented = message
        .data
        .get("args")
        .and_then(|a| a.get("token"))
        .and_then(|t| t.as_str())
        .unwrap_or_else(|| message.data_str("token"));
    if presented == expected.as_str() {
        handle.authed.store(true, Ordering::SeqCst);
        let mut data = serde_json::Map::new();
        data.insert("reply_to".to_string(), json!(message.id));
        data.insert("authenticated".to_string(), json!(true));
        let tx = handle.tx.clone();
        let status = wire::status(data);
        tokio::spawn(async move {
            let _ = tx.send(status).await;
        });
        true
    } else {
        false
    }
}

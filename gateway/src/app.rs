//! Axum app: shared state, router, and the WebSocket upgrade handler.

use std::sync::{Arc, Mutex};

use axum::{
    extract::{ws::WebSocketUpgrade, State},
    response::Response,
    routing::get,
    Router,
};
use noctua::Runtime;
use tokio::sync::oneshot;

use crate::connection::{handle_socket, ConnectionTable};
use crate::dispatch::ChatQueues;

pub(crate) struct AppState {
    pub(crate) runtime: Arc<Runtime>,
    pub(crate) connections: Arc<ConnectionTable>,
    pub(crate) chat_queues: Arc<ChatQueues>,
    /// When set, the first connection to close signals server exit (once
    /// mode, used by tests).
    pub(crate) shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
}

pub(crate) fn router(state: Arc<AppState>) -> Router {
    Router::new().route("/", get(ws_handler)).with_state(state)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    let shutdown_tx = state.shutdown_tx.lock().ok().and_then(|mut g| g.take());
    ws.on_upgrade(move |socket| handle_socket(socket, state, shutdown_tx))
}

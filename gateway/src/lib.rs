//! WebSocket broker for noctua (axum + ws).
//!
//! One gateway per process, many adapters per gateway, one agent behind it.
//! Adapters connect, receive a `status` hello carrying their `client_id`,
//! then exchange framed JSON [`wire::GatewayMessage`]s. Inbound `chat`
//! frames run through the agent loop with per-session ordering; `command`
//! frames hit the command surface; `approval_response` frames resolve the
//! approval queue. Outbound approval requests and events are routed to the
//! adapters claiming the originating channel tag, or broadcast.
//!
//! **Public API**: [`run_gateway`], [`run_gateway_on_listener`].

mod app;
mod commands;
mod connection;
mod dispatch;

use std::sync::{Arc, Mutex};

use noctua::Runtime;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::info;

use app::{router, AppState};
use connection::ConnectionTable;

/// Runs the gateway on an existing listener. Used by tests (bind to
/// 127.0.0.1:0 then pass the listener). When `once` is true, the server
/// exits after the first connection closes.
pub async fn run_gateway_on_listener(
    runtime: Arc<Runtime>,
    listener: TcpListener,
    once: bool,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = listener.local_addr()?;
    info!("gateway listening on ws://{}", addr);

    let connections = Arc::new(ConnectionTable::new());
    runtime.sink.install(Arc::clone(&connections) as Arc<dyn noctua::ChannelSink>);
    runtime.start_background();

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let state = Arc::new(AppState {
        runtime,
        connections,
        chat_queues: Arc::new(dispatch::ChatQueues::new()),
        shutdown_tx: Mutex::new(if once { Some(shutdown_tx) } else { None }),
    });

    let app = router(Arc::clone(&state));
    if once {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await?;
        info!("connection done, exiting (once mode)");
    } else {
        axum::serve(listener, app).await?;
    }
    state.runtime.shutdown();
    Ok(())
}

/// Bind `addr` (default from config) and serve until the process exits.
pub async fn run_gateway(
    runtime: Arc<Runtime>,
    addr: Option<&str>,
    once: bool,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = addr
        .map(str::to_string)
        .unwrap_or_else(|| runtime.config.gateway_addr.clone());
    let listener = TcpListener::bind(&addr).await?;
    run_gateway_on_listener(runtime, listener, once).await
}

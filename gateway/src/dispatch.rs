//! Inbound frame dispatch.
//!
//! Chats are serialized per session: each session gets a worker task fed
//! in arrival order, so message N+1 for a session never starts while the
//! loop for N is still running, while other sessions (and approval
//! responses on the same socket) proceed freely. Commands and approval
//! responses are handled inline on the read loop; both are quick.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use noctua::scrub;
use tokio::sync::mpsc;
use wire::{GatewayMessage, MessageType};

use crate::app::AppState;
use crate::commands;
use crate::connection::ConnectionHandle;

/// Worker queues expire after this long without traffic; a late chat
/// recreates the worker.
const WORKER_IDLE: Duration = Duration::from_secs(600);

struct ChatJob {
    message: GatewayMessage,
    reply: mpsc::Sender<GatewayMessage>,
}

#[derive(Default)]
pub(crate) struct ChatQueues {
    queues: DashMap<String, mpsc::UnboundedSender<ChatJob>>,
}

impl ChatQueues {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn enqueue(self: &Arc<Self>, state: &Arc<AppState>, session_id: &str, job: ChatJob) {
        let mut job = Some(job);
        loop {
            let tx = self
                .queues
                .entry(session_id.to_string())
                .or_insert_with(|| {
                    let (tx, rx) = mpsc::unbounded_channel();
                    tokio::spawn(session_worker(
                        Arc::clone(self),
                        Arc::clone(state),
                        session_id.to_string(),
                        rx,
                    ));
                    tx
                })
                .clone();
            match tx.send(job.take().expect("job present")) {
                Ok(()) => break,
                // Worker expired between lookup and send; rebuild it.
                Err(mpsc::error::SendError(returned)) => {
                    self.queues.remove(session_id);
                    job = Some(returned);
                }
            }
        }
    }
}

/// One worker per session: processes chats strictly in arrival order.
async fn session_worker(
    queues: Arc<ChatQueues>,
    state: Arc<AppState>,
    session_id: String,
    mut rx: mpsc::UnboundedReceiver<ChatJob>,
) {
    loop {
        let job = match tokio::time::timeout(WORKER_IDLE, rx.recv()).await {
            Ok(Some(job)) => job,
            Ok(None) => break,
            Err(_) => {
                // Expire: unregister first so new sends recreate a worker,
                // then drain anything that raced in.
                queues.queues.remove(&session_id);
                while let Ok(job) = rx.try_recv() {
                    process_chat(&state, job).await;
                }
                break;
            }
        };
        process_chat(&state, job).await;
    }
}

async fn process_chat(state: &Arc<AppState>, job: ChatJob) {
    let message = &job.message;
    let content = message.data_str("content");
    let result = state
        .runtime
        .handle_chat(content, &message.session_id, &message.channel, &message.user_id)
        .await;

    let outbound = match result {
        Ok((session_id, reply)) => wire::response_to(message, &reply, &session_id),
        Err(e) => {
            tracing::warn!(session = %message.session_id, "chat failed: {}", e);
            wire::error_to(message, &scrub(&e.to_string()))
        }
    };
    let _ = job.reply.send(outbound).await;
}

pub(crate) async fn handle_inbound(
    state: &Arc<AppState>,
    handle: &Arc<ConnectionHandle>,
    message: GatewayMessage,
) {
    match message.message_type {
        MessageType::Chat => {
            // Bind the session up front so ordering has a stable key; the
            // worker re-resolves it by id.
            let (session_id, _) = state
                .runtime
                .sessions
                .get_or_create(&message.session_id, &message.user_id, &message.channel)
                .await;
            let mut message = message;
            message.session_id = session_id.clone();
            state.chat_queues.enqueue(
                state,
                &session_id,
                ChatJob {
                    message,
                    reply: handle.tx.clone(),
                },
            );
        }
        MessageType::Command => {
            if let Some(reply) = commands::handle_command(state, &message).await {
                let _ = handle.tx.send(reply).await;
            }
        }
        MessageType::ApprovalResponse => {
            let request_id = message.data_str("request_id");
            let approved = message
                .data
                .get("approved")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            if !state.runtime.approvals.resolve(request_id, approved) {
                tracing::debug!(request = %request_id, "approval response for unknown or resolved id");
            }
        }
        // Filtered earlier by the directionality check.
        _ => {}
    }
}

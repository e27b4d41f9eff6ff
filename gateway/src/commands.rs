//! Command surface: `clear`, `status`, `cancel`, `mind …`, `health`,
//! `mode`, `restart`. Replies are STATUS frames with `reply_to` set; an
//! unknown command gets an ERROR.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use wire::GatewayMessage;

use crate::app::AppState;

fn status_reply(request: &GatewayMessage, data: Value) -> GatewayMessage {
    let mut map = Map::new();
    map.insert("reply_to".to_string(), json!(request.id));
    if let Value::Object(fields) = data {
        map.extend(fields);
    }
    let mut reply = wire::status(map);
    reply.session_id = request.session_id.clone();
    reply
}

/// Returns the reply frame, or None for fire-and-forget commands.
pub(crate) async fn handle_command(
    state: &Arc<AppState>,
    message: &GatewayMessage,
) -> Option<GatewayMessage> {
    let runtime = &state.runtime;
    let raw = message.data_str("command");
    let mut parts = raw.split_whitespace();
    let name = parts.next().unwrap_or("");
    let arg = parts.next().unwrap_or("");
    let args = message.data.get("args").cloned().unwrap_or(Value::Null);

    let reply = match name {
        "clear" => {
            let cleared = runtime.sessions.clear(&message.session_id).await;
            status_reply(message, json!({"cleared": cleared}))
        }
        "status" => status_reply(message, runtime.status_snapshot()),
        "health" => status_reply(message, json!({"providers": runtime.health_snapshot()})),
        "cancel" => {
            let cancelled = runtime.cancel_chat(&message.session_id);
            status_reply(message, json!({"cancelled": cancelled}))
        }
        "mind" => {
            let action = if arg.is_empty() {
                args.get("action").and_then(Value::as_str).unwrap_or("")
            } else {
                arg
            };
            match action {
                "start" => {
                    runtime.mind_handle.set_enabled(true);
                    status_reply(message, json!({"mind": "started"}))
                }
                "stop" => {
                    runtime.mind_handle.set_enabled(false);
                    status_reply(message, json!({"mind": "stopped"}))
                }
                _ => status_reply(
                    message,
                    json!({
                        "mind": {
                            "enabled": runtime.mind_handle.is_enabled(),
                            "phase": runtime.mind_handle.phase().as_str(),
                            "budget_remaining": runtime.mind_handle.budget_remaining(),
                            "next_wakeup_seconds": runtime.mind_handle.next_wakeup_secs(),
                            "last_action": runtime.mind_handle.last_action(),
                        }
                    }),
                ),
            }
        }
        "mode" => {
            let mode = args
                .get("mode")
                .and_then(Value::as_str)
                .and_then(noctua::PermissionMode::parse);
            match mode {
                Some(mode) => {
                    let applied = runtime
                        .set_session_mode(&message.session_id, Some(mode))
                        .await;
                    status_reply(message, json!({"mode": mode.as_str(), "applied": applied}))
                }
                None => wire::error_to(message, "mode requires args.mode of ask_always | smart_auto | full_auto"),
            }
        }
        "restart" => {
            runtime.restart_in_place().await;
            status_reply(message, json!({"restarted": true}))
        }
        "auth" => {
            // Token handshake is handled at the connection layer; an auth
            // command on an open connection is a no-op acknowledgement.
            status_reply(message, json!({"authenticated": true}))
        }
        other => {
            tracing::debug!(command = %other, "unknown command");
            wire::error_to(message, &format!("unknown command '{}'", other))
        }
    };
    Some(reply)
}

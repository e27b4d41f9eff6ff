//! Loop bounds and the resolved chat request handed to the runner.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::permission::{Authority, PermissionMode};
use crate::runtime_state::ContextMode;

#[derive(Clone, Debug)]
pub struct AgentOptions {
    /// Think-act-observe iterations before the loop summarises and stops.
    pub max_steps: usize,
    /// Wall-clock ceiling for one chat request.
    pub max_time: Duration,
    /// Conversation turns replayed into each prompt.
    pub history_window: usize,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            max_steps: 24,
            max_time: Duration::from_secs(600),
            history_window: 40,
        }
    }
}

/// One chat to process. The gateway resolves the session, the permission
/// mode (session override or global), and the caller's authority before
/// constructing this.
#[derive(Clone, Debug)]
pub struct ChatRequest {
    pub content: String,
    pub session_id: String,
    pub channel: String,
    pub authority: Authority,
    pub mode: PermissionMode,
    pub context: ContextMode,
    /// Budget key: one chat request, one mind cycle, or one goal
    /// checkpoint.
    pub task_id: String,
    pub cancel: CancellationToken,
}

impl ChatRequest {
    pub fn user_chat(content: &str, session_id: &str, channel: &str) -> Self {
        Self {
            content: content.to_string(),
            session_id: session_id.to_string(),
            channel: channel.to_string(),
            authority: Authority::Owner,
            mode: PermissionMode::SmartAuto,
            context: ContextMode::UserChat,
            task_id: format!("chat-{}", uuid::Uuid::new_v4()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_mode(mut self, mode: PermissionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_authority(mut self, authority: Authority) -> Self {
        self.authority = authority;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

//! Per-call context handed to tools during execution.

use tokio_util::sync::CancellationToken;

use crate::permission::Authority;

/// Context the loop (or the mind) injects before calling a tool.
///
/// `cancel` is the chat request's cancellation token; tools with long-
/// running work should observe it. Uncooperative tools run to completion
/// and have their results discarded by the caller.
#[derive(Clone, Debug)]
pub struct ToolCallContext {
    /// Session the call belongs to; empty for mind cycles.
    pub session_id: String,
    /// Originating channel tag ("cli", "telegram", ...; "mind" for cycles).
    pub channel: String,
    pub authority: Authority,
    pub cancel: CancellationToken,
}

impl ToolCallContext {
    pub fn new(session_id: &str, channel: &str, authority: Authority) -> Self {
        Self {
            session_id: session_id.to_string(),
            channel: channel.to_string(),
            authority,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

impl Default for ToolCallContext {
    fn default() -> Self {
        Self::new("", "cli", Authority::Owner)
    }
}

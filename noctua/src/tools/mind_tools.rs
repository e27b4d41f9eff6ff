//! Mind tools: persistent scratchpad and wakeup control.
//!
//! Both are SAFE and on the static exemption list; the mind calls them at
//! the end of every think cycle.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{Tool, ToolCallContext, ToolResult};
use crate::mind::MindHandle;
use crate::permission::PermissionTier;

/// Replace the mind's persistent working memory (free-form markdown that
/// survives across wakeup cycles).
pub struct UpdateScratchpadTool {
    path: PathBuf,
}

impl UpdateScratchpadTool {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl Tool for UpdateScratchpadTool {
    fn name(&self) -> &str {
        "update_scratchpad"
    }

    fn description(&self) -> &str {
        "Replace the contents of your persistent working memory (scratchpad). \
         It survives across wakeup cycles; update it before finishing a think \
         cycle to maintain continuity."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "content": {
                    "type": "string",
                    "description": "Full markdown content for the scratchpad (replaces current)",
                },
            },
            "required": ["content"],
        })
    }

    fn permission_tier(&self) -> PermissionTier {
        PermissionTier::Safe
    }

    async fn execute(&self, params: Value, _ctx: &ToolCallContext) -> ToolResult {
        let content = params.get("content").and_then(Value::as_str).unwrap_or("");
        if let Some(parent) = self.path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return ToolResult::fail(format!("mkdir: {}", e));
            }
        }
        match tokio::fs::write(&self.path, content).await {
            Ok(()) => ToolResult::ok(json!({
                "length": content.len(),
                "path": self.path.display().to_string(),
            })),
            Err(e) => ToolResult::fail(format!("write scratchpad: {}", e)),
        }
    }
}

/// Let the mind control its own sleep interval.
pub struct SetNextWakeupTool {
    handle: Arc<MindHandle>,
}

impl SetNextWakeupTool {
    pub fn new(handle: Arc<MindHandle>) -> Self {
        Self { handle }
    }
}

#[async_trait]
impl Tool for SetNextWakeupTool {
    fn name(&self) -> &str {
        "set_next_wakeup"
    }

    fn description(&self) -> &str {
        "Set how many seconds until your next autonomous thinking cycle. \
         Short intervals (60-120s) when actively monitoring something, long \
         ones (600-1800s) when nothing is happening. Range: 60-3600."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "seconds": {
                    "type": "integer",
                    "description": "Seconds until next wakeup (60-3600)",
                },
                "reason": {
                    "type": "string",
                    "description": "Brief reason for this interval",
                },
            },
            "required": ["seconds"],
        })
    }

    fn permission_tier(&self) -> PermissionTier {
        PermissionTier::Safe
    }

    async fn execute(&self, params: Value, _ctx: &ToolCallContext) -> ToolResult {
        let seconds = params.get("seconds").and_then(Value::as_u64).unwrap_or(300);
        let clamped = self.handle.set_next_wakeup(seconds);
        let reason = params.get("reason").and_then(Value::as_str).unwrap_or("");
        ToolResult::ok(json!({
            "next_wakeup_seconds": clamped,
            "reason": reason,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mind::MindConfig;

    #[tokio::test]
    async fn scratchpad_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("scratchpad.md");
        let tool = UpdateScratchpadTool::new(path.clone());
        let ctx = ToolCallContext::default();

        let result = tool.execute(json!({"content": "# first"}), &ctx).await;
        assert!(result.success);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# first");

        tool.execute(json!({"content": "# second"}), &ctx).await;
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# second");
    }

    #[tokio::test]
    async fn wakeup_clamps_to_bounds() {
        let handle = MindHandle::new(&MindConfig::default());
        let tool = SetNextWakeupTool::new(Arc::clone(&handle));
        let ctx = ToolCallContext::default();

        let result = tool.execute(json!({"seconds": 10}), &ctx).await;
        assert_eq!(result.data["next_wakeup_seconds"], 60);

        let result = tool.execute(json!({"seconds": 7200}), &ctx).await;
        assert_eq!(result.data["next_wakeup_seconds"], 3600);
        assert_eq!(handle.next_wakeup_secs(), 3600);
    }
}

//! Shell execution tool (DESTRUCTIVE).
//!
//! Runs the command under `sh -lc` with a wall-clock timeout and observes
//! the call's cancellation token: a cancelled chat kills the child and the
//! result reports the cancellation.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;

use super::{Tool, ToolCallContext, ToolResult};
use crate::permission::PermissionTier;

const MAX_OUTPUT_CHARS: usize = 10_000;
const DEFAULT_TIMEOUT_SECS: u64 = 60;

pub struct ShellExecuteTool {
    timeout: Duration,
}

impl ShellExecuteTool {
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for ShellExecuteTool {
    fn default() -> Self {
        Self::new()
    }
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_OUTPUT_CHARS {
        text.to_string()
    } else {
        let head: String = text.chars().take(MAX_OUTPUT_CHARS).collect();
        format!("{}\n[truncated]", head)
    }
}

#[async_trait]
impl Tool for ShellExecuteTool {
    fn name(&self) -> &str {
        "shell_execute"
    }

    fn description(&self) -> &str {
        "Run a shell command and return stdout, stderr, and the exit code."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {"type": "string", "description": "Command to run under sh -lc"},
            },
            "required": ["command"],
        })
    }

    fn permission_tier(&self) -> PermissionTier {
        PermissionTier::Destructive
    }

    async fn execute(&self, params: Value, ctx: &ToolCallContext) -> ToolResult {
        let Some(command) = params.get("command").and_then(Value::as_str) else {
            return ToolResult::fail("'command' is required");
        };

        let mut child = match Command::new("sh")
            .arg("-lc")
            .arg(command)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => return ToolResult::fail(format!("spawn: {}", e)),
        };

        let output = tokio::select! {
            out = child.wait_with_output() => match out {
                Ok(out) => out,
                Err(e) => return ToolResult::fail(format!("wait: {}", e)),
            },
            _ = ctx.cancel.cancelled() => {
                return ToolResult::fail("command cancelled");
            }
            _ = tokio::time::sleep(self.timeout) => {
                return ToolResult::fail(format!(
                    "command timed out after {}s",
                    self.timeout.as_secs()
                ));
            }
        };

        let stdout = truncate(&String::from_utf8_lossy(&output.stdout));
        let stderr = truncate(&String::from_utf8_lossy(&output.stderr));
        let exit_code = output.status.code().unwrap_or(-1);

        if output.status.success() {
            ToolResult::ok(json!({
                "stdout": stdout,
                "stderr": stderr,
                "exit_code": exit_code,
            }))
        } else {
            let mut result = ToolResult::fail(format!("exit code {}", exit_code));
            result.data.insert("stdout".to_string(), json!(stdout));
            result.data.insert("stderr".to_string(), json!(stderr));
            result.data.insert("exit_code".to_string(), json!(exit_code));
            result
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let tool = ShellExecuteTool::new();
        let result = tool
            .execute(json!({"command": "echo hello"}), &ToolCallContext::default())
            .await;
        assert!(result.success);
        assert_eq!(result.data["stdout"].as_str().unwrap().trim(), "hello");
        assert_eq!(result.data["exit_code"], 0);
    }

    #[tokio::test]
    async fn nonzero_exit_is_failure_with_output() {
        let tool = ShellExecuteTool::new();
        let result = tool
            .execute(
                json!({"command": "echo oops >&2; exit 3"}),
                &ToolCallContext::default(),
            )
            .await;
        assert!(!result.success);
        assert_eq!(result.data["exit_code"], 3);
        assert!(result.data["stderr"].as_str().unwrap().contains("oops"));
    }

    #[tokio::test]
    async fn cancellation_kills_the_command() {
        let tool = ShellExecuteTool::new();
        let ctx = ToolCallContext::default();
        let cancel = ctx.cancel.clone();
        let handle = tokio::spawn(async move {
            tool.execute(json!({"command": "sleep 30"}), &ctx).await
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        let result = handle.await.unwrap();
        assert!(!result.success);
        assert!(result.error.unwrap().contains("cancelled"));
    }

    #[test]
    fn truncate_is_char_safe_on_multibyte_output() {
        let long_ascii = "x".repeat(MAX_OUTPUT_CHARS + 10);
        assert!(truncate(&long_ascii).ends_with("[truncated]"));

        // A cut point landing inside a multi-byte char must not panic.
        let long_multibyte = "\u{00e9}".repeat(MAX_OUTPUT_CHARS + 10);
        let out = truncate(&long_multibyte);
        assert!(out.ends_with("[truncated]"));
        assert_eq!(out.chars().filter(|c| *c == '\u{00e9}').count(), MAX_OUTPUT_CHARS);

        let short = "caf\u{00e9}";
        assert_eq!(truncate(short), short);
    }

    #[tokio::test]
    async fn timeout_reported() {
        let tool = ShellExecuteTool::new().with_timeout(Duration::from_millis(50));
        let result = tool
            .execute(json!({"command": "sleep 5"}), &ToolCallContext::default())
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("timed out"));
    }
}

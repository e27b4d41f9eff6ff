//! Permission-gated tool execution.
//!
//! Every tool call from the loop, the mind, or the goal runner goes through
//! [`GatedExecutor::run_tool_call`]: registry lookup, argument validation,
//! permission evaluation, the approval round-trip when gated, then the
//! actual execution under the caller's cancellation token. Denials and
//! timeouts come back as failed `ToolResult`s, never as errors; the caller
//! folds them into an observation and the model picks another path.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use crate::approval::{ApprovalOutcome, ApprovalQueue, ApprovalRequest};
use crate::llm::ToolCall;
use crate::permission::{evaluate, Decision, PermissionMode};
use crate::sink::SharedSink;
use crate::tools::{SharedToolRegistry, ToolCallContext, ToolResult};

#[derive(Clone)]
pub struct GatedExecutor {
    registry: SharedToolRegistry,
    approvals: Arc<ApprovalQueue>,
    sink: SharedSink,
}

impl GatedExecutor {
    pub fn new(registry: SharedToolRegistry, approvals: Arc<ApprovalQueue>, sink: SharedSink) -> Self {
        Self {
            registry,
            approvals,
            sink,
        }
    }

    pub fn registry(&self) -> &SharedToolRegistry {
        &self.registry
    }

    pub async fn run_tool_call(
        &self,
        call: &ToolCall,
        mode: PermissionMode,
        ctx: &ToolCallContext,
    ) -> ToolResult {
        let Some(tool) = self.registry.get(&call.name) else {
            return ToolResult::fail(format!("unknown tool '{}'", call.name));
        };

        let problems = tool.validate_input(&call.arguments);
        if !problems.is_empty() {
            return ToolResult::fail(format!("invalid arguments: {}", problems.join("; ")));
        }

        match evaluate(&call.name, tool.permission_tier(), mode, ctx.authority) {
            Decision::Allow => {}
            Decision::Deny(reason) => {
                tracing::info!(tool = %call.name, "permission denied: {}", reason);
                return ToolResult::fail(format!("permission denied: {}", reason));
            }
            Decision::RequireApproval => match self.request_approval(call, &tool, ctx).await {
                ApprovalOutcome::Approved => {}
                ApprovalOutcome::Denied => {
                    return ToolResult::fail(format!(
                        "approval denied for '{}'; the action was not performed",
                        call.name
                    ));
                }
                ApprovalOutcome::TimedOut => {
                    self.sink.send_to_channel(
                        &ctx.channel,
                        wire::event(
                            "approval_timeout",
                            json!({"tool_name": call.name}),
                            &ctx.session_id,
                        ),
                    );
                    return ToolResult::fail(format!(
                        "approval for '{}' timed out and was treated as denied",
                        call.name
                    ));
                }
            },
        }

        tokio::select! {
            result = tool.execute(call.arguments.clone(), ctx) => result,
            _ = ctx.cancel.cancelled() => {
                tracing::info!(tool = %call.name, "tool call cancelled, result discarded");
                ToolResult::fail("cancelled")
            }
        }
    }

    async fn request_approval(
        &self,
        call: &ToolCall,
        tool: &Arc<dyn crate::tools::Tool>,
        ctx: &ToolCallContext,
    ) -> ApprovalOutcome {
        let message = wire::approval_request(
            &call.name,
            tool.description(),
            call.arguments.clone(),
            &ctx.session_id,
            &ctx.channel,
        );
        let ticket = self.approvals.enqueue(ApprovalRequest {
            id: message.id.clone(),
            tool_name: call.name.clone(),
            description: tool.description().to_string(),
            params: call.arguments.clone(),
            session_id: ctx.session_id.clone(),
            channel: ctx.channel.clone(),
            created_at: Utc::now(),
        });
        self.sink.send_to_channel(&ctx.channel, message);
        ticket.wait().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::DEFAULT_APPROVAL_TIMEOUT;
    use crate::permission::{Authority, PermissionTier};
    use crate::sink::test_support::RecordingSink;
    use crate::tools::Tool;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::time::Duration;

    struct WriteLike;

    #[async_trait]
    impl Tool for WriteLike {
        fn name(&self) -> &str {
            "fake_write"
        }
        fn description(&self) -> &str {
            "write something"
        }
        fn input_schema(&self) -> Value {
            json!({"type": "object", "properties": {"path": {"type": "string"}}, "required": ["path"]})
        }
        fn permission_tier(&self) -> PermissionTier {
            PermissionTier::Moderate
        }
        async fn execute(&self, _params: Value, _ctx: &ToolCallContext) -> ToolResult {
            ToolResult::ok(json!({"written": true}))
        }
    }

    fn executor(timeout: Duration) -> (GatedExecutor, Arc<ApprovalQueue>, Arc<RecordingSink>) {
        let registry = SharedToolRegistry::new();
        registry.register(Arc::new(WriteLike));
        let approvals = Arc::new(ApprovalQueue::new(timeout));
        let sink = RecordingSink::new();
        let shared = SharedSink::new();
        shared.install(sink.clone());
        (
            GatedExecutor::new(registry, Arc::clone(&approvals), shared),
            approvals,
            sink,
        )
    }

    fn call() -> ToolCall {
        ToolCall {
            id: "c1".to_string(),
            name: "fake_write".to_string(),
            arguments: json!({"path": "/tmp/x"}),
        }
    }

    #[tokio::test]
    async fn gated_call_emits_approval_request_and_waits() {
        let (gate, approvals, sink) = executor(DEFAULT_APPROVAL_TIMEOUT);
        let ctx = ToolCallContext::new("s1", "cli", Authority::Owner);

        let approvals_clone = Arc::clone(&approvals);
        let approver = tokio::spawn(async move {
            // Wait until the request shows up, then approve it.
            loop {
                let pending = approvals_clone.pending(10);
                if let Some(req) = pending.first() {
                    approvals_clone.resolve(&req.id, true);
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });

        let result = gate
            .run_tool_call(&call(), PermissionMode::AskAlways, &ctx)
            .await;
        approver.await.unwrap();

        assert!(result.success);
        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "cli");
        assert_eq!(sent[0].1.data_str("tool_name"), "fake_write");
    }

    #[tokio::test]
    async fn denial_becomes_failed_result() {
        let (gate, approvals, _sink) = executor(DEFAULT_APPROVAL_TIMEOUT);
        let ctx = ToolCallContext::new("s1", "cli", Authority::Owner);

        let approvals_clone = Arc::clone(&approvals);
        tokio::spawn(async move {
            loop {
                if let Some(req) = approvals_clone.pending(10).first() {
                    approvals_clone.resolve(&req.id, false);
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });

        let result = gate
            .run_tool_call(&call(), PermissionMode::AskAlways, &ctx)
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("approval denied"));
    }

    #[tokio::test]
    async fn timeout_is_denial_and_emits_event() {
        let (gate, _approvals, sink) = executor(Duration::from_millis(30));
        let ctx = ToolCallContext::new("s1", "cli", Authority::Owner);

        let result = gate
            .run_tool_call(&call(), PermissionMode::AskAlways, &ctx)
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("timed out"));

        let sent = sink.sent.lock().unwrap();
        let timeout_events: Vec<_> = sent
            .iter()
            .filter(|(_, m)| m.data_str("event") == "approval_timeout")
            .collect();
        assert_eq!(timeout_events.len(), 1);
    }

    #[tokio::test]
    async fn smart_auto_runs_moderate_without_approval() {
        let (gate, approvals, sink) = executor(DEFAULT_APPROVAL_TIMEOUT);
        let ctx = ToolCallContext::new("s1", "cli", Authority::Owner);

        let result = gate
            .run_tool_call(&call(), PermissionMode::SmartAuto, &ctx)
            .await;
        assert!(result.success);
        assert!(approvals.is_empty());
        assert!(sink.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_tool_and_bad_arguments_fail() {
        let (gate, _approvals, _sink) = executor(DEFAULT_APPROVAL_TIMEOUT);
        let ctx = ToolCallContext::new("s1", "cli", Authority::Owner);

        let unknown = gate
            .run_tool_call(
                &ToolCall {
                    id: "x".into(),
                    name: "nope".into(),
                    arguments: json!({}),
                },
                PermissionMode::FullAuto,
                &ctx,
            )
            .await;
        assert!(!unknown.success);

        let invalid = gate
            .run_tool_call(
                &ToolCall {
                    id: "y".into(),
                    name: "fake_write".into(),
                    arguments: json!({}),
                },
                PermissionMode::FullAuto,
                &ctx,
            )
            .await;
        assert!(!invalid.success);
        assert!(invalid.error.unwrap().contains("missing required field"));
    }
}

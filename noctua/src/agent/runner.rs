//! The reasoning loop: compose prompt, call the router, gate and execute
//! tool calls, accumulate observations, repeat until the model answers in
//! plain text or a bound trips.

use std::sync::Arc;
use std::time::Instant;

use crate::approval::ApprovalQueue;
use crate::error::AgentError;
use crate::fingerprint::FingerprintStatus;
use crate::llm::{LlmRouter, RouterError, TaskType};
use crate::message::Message;
use crate::runtime_state::RuntimeState;
use crate::session::{Session, SessionManager};
use crate::tools::ToolCallContext;

use super::gate::GatedExecutor;
use super::options::{AgentOptions, ChatRequest};

const SYSTEM_PROMPT: &str = "You are noctua, a persistent personal agent. \
Work step by step: call tools when you need real data or side effects, and \
answer in plain text when you are done. Tool denials are not errors; pick \
another path or explain what was blocked.";

/// Tools whose observation steers the next step toward the `coding` task
/// type instead of `analysis`.
const CODE_TOOLS: &[&str] = &["file_write", "file_move", "shell_execute"];

const BUDGET_APOLOGY: &str = "I have hit the spending limit for this request \
and have to stop here. Ask again to continue with a fresh budget.";

pub struct AgentRunner {
    router: Arc<LlmRouter>,
    gate: GatedExecutor,
    sessions: Arc<SessionManager>,
    approvals: Arc<ApprovalQueue>,
    options: AgentOptions,
    fingerprint: String,
    fingerprint_status: FingerprintStatus,
    max_sessions: usize,
}

impl AgentRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        router: Arc<LlmRouter>,
        gate: GatedExecutor,
        sessions: Arc<SessionManager>,
        approvals: Arc<ApprovalQueue>,
        options: AgentOptions,
        fingerprint: String,
        fingerprint_status: FingerprintStatus,
        max_sessions: usize,
    ) -> Self {
        Self {
            router,
            gate,
            sessions,
            approvals,
            options,
            fingerprint,
            fingerprint_status,
            max_sessions,
        }
    }

    pub fn gate(&self) -> &GatedExecutor {
        &self.gate
    }

    pub fn router(&self) -> &Arc<LlmRouter> {
        &self.router
    }

    /// Runtime-state block for the current caller; rebuilt from live data
    /// on every step.
    pub fn system_prompt(&self, req: &ChatRequest) -> String {
        let stats = self.router.tracker().provider_stats();
        let state = RuntimeState {
            fingerprint: &self.fingerprint,
            fingerprint_status: self.fingerprint_status.as_str(),
            tools: self.gate.registry().counts(req.authority),
            authority: req.authority.as_str(),
            channel: &req.channel,
            context_mode: req.context,
            active_sessions: self.sessions.active_count(),
            max_sessions: self.max_sessions,
            pending_approvals: self.approvals.len(),
            provider_stats: &stats,
        };
        format!("{}\n\n{}", SYSTEM_PROMPT, state.render())
    }

    fn prompt_messages(&self, system: &str, history: &[Message]) -> Vec<Message> {
        let tail_start = history.len().saturating_sub(self.options.history_window);
        let mut messages = Vec::with_capacity(history.len() - tail_start + 1);
        messages.push(Message::system(system));
        messages.extend_from_slice(&history[tail_start..]);
        messages
    }

    /// Run one chat to completion against the session the caller has
    /// locked. Returns the final assistant text.
    pub async fn run_chat(
        &self,
        session: &mut Session,
        req: &ChatRequest,
    ) -> Result<String, AgentError> {
        let started = Instant::now();
        session.touch();
        self.push_turn(session, Message::user(req.content.clone())).await;

        let schemas = self.gate.registry().schemas(req.authority);
        let ctx = ToolCallContext::new(&req.session_id, &req.channel, req.authority)
            .with_cancel(req.cancel.clone());
        let mut last_tool: Option<String> = None;

        for step in 1..=self.options.max_steps {
            if req.cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            if started.elapsed() >= self.options.max_time {
                tracing::warn!(session = %req.session_id, "chat hit the wall-clock ceiling");
                return self.summarize(session, req).await;
            }

            let task = if step == 1 {
                TaskType::Planning
            } else if last_tool
                .as_deref()
                .map(|t| CODE_TOOLS.contains(&t))
                .unwrap_or(false)
            {
                TaskType::Coding
            } else {
                TaskType::Analysis
            };

            let system = self.system_prompt(req);
            let messages = self.prompt_messages(&system, &session.history);
            let completion = match self
                .router
                .complete(task, &req.task_id, &messages, &schemas)
                .await
            {
                Ok(completion) => completion,
                Err(RouterError::BudgetExhausted(scope)) => {
                    tracing::warn!(session = %req.session_id, "budget exhausted: {}", scope);
                    self.push_turn(session, Message::assistant(BUDGET_APOLOGY)).await;
                    return Ok(BUDGET_APOLOGY.to_string());
                }
                Err(e) => return Err(AgentError::Router(e)),
            };

            if completion.tool_calls.is_empty() {
                self.push_turn(session, Message::assistant(completion.content.clone()))
                    .await;
                return Ok(completion.content);
            }

            if !completion.content.is_empty() {
                self.push_turn(session, Message::assistant(completion.content.clone()))
                    .await;
            }

            for call in &completion.tool_calls {
                if req.cancel.is_cancelled() {
                    return Err(AgentError::Cancelled);
                }
                let result = self.gate.run_tool_call(call, req.mode, &ctx).await;
                last_tool = Some(call.name.clone());
                self.push_turn(session, Message::tool(call.name.clone(), result.to_json()))
                    .await;
            }
        }

        tracing::warn!(
            session = %req.session_id,
            max_steps = self.options.max_steps,
            "chat hit the step limit"
        );
        self.summarize(session, req).await
    }

    /// Step or time limit tripped: one last summarising turn, produced by
    /// the router when the budget still allows it.
    async fn summarize(
        &self,
        session: &mut Session,
        req: &ChatRequest,
    ) -> Result<String, AgentError> {
        let system = self.system_prompt(req);
        let mut messages = self.prompt_messages(&system, &session.history);
        messages.push(Message::user(
            "You are out of steps for this request. Summarise what you did and \
             what remains, in a short final answer."
                .to_string(),
        ));
        let content = match self
            .router
            .complete(TaskType::Summary, &req.task_id, &messages, &[])
            .await
        {
            Ok(completion) if !completion.content.is_empty() => completion.content,
            _ => "I hit the step limit for this request before finishing.".to_string(),
        };
        self.push_turn(session, Message::assistant(content.clone())).await;
        Ok(content)
    }

    async fn push_turn(&self, session: &mut Session, message: Message) {
        if let Err(e) = self.sessions.persist_turn(&session.id, &message).await {
            tracing::warn!(session = %session.id, "turn persist failed: {}", e);
        }
        session.history.push(message);
        session.touch();
    }
}

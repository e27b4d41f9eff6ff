//! Goal execution across process restarts.
//!
//! A single consumer task owns goal execution, so at most one goal runs at
//! a time. Each checkpoint is one agent-loop invocation with its own LLM
//! budget; the loop's terminal reply decides the checkpoint outcome. User
//! chat preempts the runner between checkpoints (never mid-checkpoint); a
//! process restart resumes any `active` goal at its current checkpoint.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::agent::{AgentRunner, ChatRequest};
use crate::message::Message;
use crate::mind::ActivityMonitor;
use crate::permission::{Authority, PermissionMode};
use crate::runtime_state::ContextMode;
use crate::session::Session;
use crate::sink::SharedSink;
use crate::store::Store;

use super::{CheckpointStatus, GoalStatus};

/// Marker the checkpoint prompt asks the loop to end with.
const COMPLETE_MARKER: &str = "CHECKPOINT COMPLETE";

#[derive(Clone, Debug)]
pub enum GoalCommand {
    Start(String),
    Resume(String),
    Cancel(String),
    Pause,
}

#[derive(Clone, Copy, Debug)]
pub struct GoalRunnerConfig {
    /// Attempts per checkpoint before the goal fails.
    pub max_attempts: u32,
    /// Idle window a user chat blocks checkpoint starts for.
    pub preempt_idle: Duration,
}

impl Default for GoalRunnerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            preempt_idle: Duration::from_secs(60),
        }
    }
}

pub struct GoalRunner {
    store: Store,
    agent: Arc<AgentRunner>,
    sink: SharedSink,
    activity: Arc<ActivityMonitor>,
    config: GoalRunnerConfig,
    commands: mpsc::Receiver<GoalCommand>,
}

impl GoalRunner {
    pub fn new(
        store: Store,
        agent: Arc<AgentRunner>,
        sink: SharedSink,
        activity: Arc<ActivityMonitor>,
        config: GoalRunnerConfig,
    ) -> (Self, mpsc::Sender<GoalCommand>) {
        let (tx, rx) = mpsc::channel(16);
        (
            Self {
                store,
                agent,
                sink,
                activity,
                config,
                commands: rx,
            },
            tx,
        )
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            let command = tokio::select! {
                _ = cancel.cancelled() => break,
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => cmd,
                    None => break,
                },
            };
            match command {
                GoalCommand::Start(id) | GoalCommand::Resume(id) => {
                    self.execute_goal(&id, &cancel).await;
                }
                GoalCommand::Cancel(id) => {
                    self.mark_cancelled(&id).await;
                }
                // Nothing is running between commands; a pause that
                // arrives mid-goal is handled inside execute_goal.
                GoalCommand::Pause => {}
            }
        }
    }

    /// Execute checkpoints until the goal completes, fails, or is paused.
    pub async fn execute_goal(&mut self, goal_id: &str, cancel: &CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                return;
            }
            if self.drain_commands(goal_id).await {
                return;
            }

            let mut goal = match self.store.get_goal(goal_id).await {
                Ok(goal) => goal,
                Err(e) => {
                    tracing::warn!(goal = %goal_id, "goal load failed: {}", e);
                    return;
                }
            };
            if goal.status != GoalStatus::Active {
                return;
            }

            let checkpoints = match self.store.load_checkpoints(goal_id).await {
                Ok(cps) => cps,
                Err(e) => {
                    tracing::warn!(goal = %goal_id, "checkpoint load failed: {}", e);
                    return;
                }
            };
            let Some(mut checkpoint) = checkpoints
                .into_iter()
                .find(|cp| cp.status != CheckpointStatus::Complete)
            else {
                goal.status = GoalStatus::Completed;
                let _ = self.store.update_goal(&goal).await;
                self.sink.broadcast(wire::event(
                    "goal_completed",
                    json!({"goal_id": goal.id, "goal": goal.goal}),
                    "",
                ));
                tracing::info!(goal = %goal.id, "goal completed");
                return;
            };

            // User chat preempts between checkpoints, never mid-checkpoint.
            while self.activity.active_within(self.config.preempt_idle) {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(Duration::from_secs(5)) => {}
                }
                if self.drain_commands(goal_id).await {
                    return;
                }
            }

            checkpoint.status = CheckpointStatus::Running;
            checkpoint.attempts += 1;
            let _ = self.store.update_checkpoint(&checkpoint).await;

            let reply = self.run_checkpoint(&goal, &checkpoint, cancel).await;
            let succeeded = reply
                .as_deref()
                .map(|r| r.contains(COMPLETE_MARKER))
                .unwrap_or(false);

            if succeeded {
                let summary: String = reply
                    .unwrap_or_default()
                    .replace(COMPLETE_MARKER, "")
                    .trim()
                    .chars()
                    .take(500)
                    .collect();
                checkpoint.status = CheckpointStatus::Complete;
                checkpoint.result_summary = summary.clone();
                let _ = self.store.update_checkpoint(&checkpoint).await;

                goal.current_checkpoint = checkpoint.ord + 1;
                if !summary.is_empty() {
                    goal.context_summary = format!(
                        "{}\n[{}] {}: {}",
                        goal.context_summary, checkpoint.ord, checkpoint.title, summary
                    )
                    .trim()
                    .to_string();
                }
                goal.llm_calls += 1;
                let _ = self.store.update_goal(&goal).await;
                tracing::info!(goal = %goal.id, checkpoint = checkpoint.ord, "checkpoint complete");
                continue;
            }

            if checkpoint.attempts >= self.config.max_attempts {
                checkpoint.status = CheckpointStatus::Failed;
                let _ = self.store.update_checkpoint(&checkpoint).await;
                goal.status = GoalStatus::Failed;
                let _ = self.store.update_goal(&goal).await;
                self.sink.broadcast(wire::event(
                    "goal_failed",
                    json!({
                        "goal_id": goal.id,
                        "checkpoint": checkpoint.ord,
                        "title": checkpoint.title,
                    }),
                    "",
                ));
                tracing::warn!(goal = %goal.id, checkpoint = checkpoint.ord, "goal failed");
                return;
            }

            tracing::info!(
                goal = %goal.id,
                checkpoint = checkpoint.ord,
                attempt = checkpoint.attempts,
                "checkpoint attempt failed, retrying"
            );
            checkpoint.status = CheckpointStatus::Pending;
            let _ = self.store.update_checkpoint(&checkpoint).await;
        }
    }

    /// One agent-loop invocation scoped to the checkpoint.
    async fn run_checkpoint(
        &self,
        goal: &super::Goal,
        checkpoint: &super::Checkpoint,
        cancel: &CancellationToken,
    ) -> Option<String> {
        let prompt = format!(
            "You are executing one checkpoint of a long-running goal.\n\n\
             Goal: {}\n\
             Checkpoint {} of {}: {}\n\
             Success criteria: {}\n\
             Context from earlier checkpoints:\n{}\n\n\
             Work the checkpoint with your tools. End your final answer with \
             the exact words {} if the success criteria are met, otherwise \
             explain what failed.",
            goal.goal,
            checkpoint.ord + 1,
            goal.total_checkpoints,
            checkpoint.title,
            checkpoint.success_criteria,
            if goal.context_summary.is_empty() {
                "(none)"
            } else {
                goal.context_summary.as_str()
            },
            COMPLETE_MARKER,
        );

        // Checkpoint work runs in its own throwaway conversation; goal
        // context travels through context_summary, not session history.
        let mut session = Session {
            id: format!("goal-{}", goal.id),
            user_id: "goal-runner".to_string(),
            channel: "goal".to_string(),
            mode_override: None,
            history: vec![Message::system(format!("Goal context: {}", goal.goal))],
            last_active: Utc::now(),
        };
        let request = ChatRequest {
            content: prompt,
            session_id: session.id.clone(),
            channel: "goal".to_string(),
            authority: Authority::Owner,
            mode: PermissionMode::SmartAuto,
            context: ContextMode::Goal,
            task_id: format!("goal-{}-cp-{}", goal.id, checkpoint.ord),
            cancel: cancel.child_token(),
        };

        match self.agent.run_chat(&mut session, &request).await {
            Ok(reply) => Some(reply),
            Err(e) => {
                tracing::warn!(goal = %goal.id, "checkpoint loop error: {}", e);
                None
            }
        }
    }

    /// Apply queued commands; true means stop executing the current goal.
    async fn drain_commands(&mut self, current_goal: &str) -> bool {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                GoalCommand::Pause => {
                    let _ = self.pause_current(current_goal).await;
                    return true;
                }
                GoalCommand::Cancel(id) if id == current_goal => {
                    self.mark_cancelled(&id).await;
                    return true;
                }
                GoalCommand::Cancel(id) => self.mark_cancelled(&id).await,
                // A new start while one goal runs waits its turn in the
                // channel order; requeue is not supported mid-run.
                GoalCommand::Start(id) | GoalCommand::Resume(id) => {
                    tracing::warn!(goal = %id, "goal start ignored while another goal is running");
                }
            }
        }
        false
    }

    async fn pause_current(&self, goal_id: &str) -> Result<(), crate::error::StoreError> {
        let mut goal = self.store.get_goal(goal_id).await?;
        if goal.status == GoalStatus::Active {
            goal.status = GoalStatus::Paused;
            self.store.update_goal(&goal).await?;
            tracing::info!(goal = %goal_id, "goal paused");
        }
        Ok(())
    }

    async fn mark_cancelled(&self, goal_id: &str) {
        match self.store.get_goal(goal_id).await {
            Ok(mut goal) if matches!(goal.status, GoalStatus::Active | GoalStatus::Paused) => {
                goal.status = GoalStatus::Cancelled;
                let _ = self.store.update_goal(&goal).await;
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(goal = %goal_id, "cancel failed: {}", e),
        }
    }
}

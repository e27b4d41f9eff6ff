//! Goal creation, LLM decomposition, and status transitions.

use std::sync::Arc;

use serde_json::Value;

use crate::error::{AgentError, StoreError};
use crate::llm::{LlmRouter, TaskType};
use crate::message::Message;
use crate::store::Store;

use super::{Checkpoint, CheckpointStatus, Goal, GoalStatus};

const DECOMPOSE_PROMPT: &str = "Decompose the goal below into 3 to 7 ordered \
checkpoints. Respond with ONLY a JSON array of objects, each with \"title\" \
and \"success_criteria\" strings, in execution order.\n\nGoal: ";

pub struct GoalManager {
    store: Store,
    router: Arc<LlmRouter>,
}

impl GoalManager {
    pub fn new(store: Store, router: Arc<LlmRouter>) -> Self {
        Self { store, router }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub async fn create_goal(&self, text: &str) -> Result<Goal, StoreError> {
        let goal = Goal::new(text);
        self.store.insert_goal(&goal).await?;
        Ok(goal)
    }

    /// One planning call that must yield the ordered checkpoint list; both
    /// the goal and its checkpoints are persisted before this returns.
    pub async fn decompose(&self, goal: &mut Goal) -> Result<Vec<Checkpoint>, AgentError> {
        let prompt = format!("{}{}", DECOMPOSE_PROMPT, goal.goal);
        let task_id = format!("goal-{}-decompose", goal.id);
        let completion = self
            .router
            .complete(TaskType::Planning, &task_id, &[Message::user(prompt)], &[])
            .await?;
        goal.llm_calls += 1;

        let items = extract_json_array(&completion.content).ok_or_else(|| {
            AgentError::Other(format!(
                "goal decomposition did not return a JSON array: {}",
                completion.content.chars().take(200).collect::<String>()
            ))
        })?;

        let checkpoints: Vec<Checkpoint> = items
            .iter()
            .filter_map(|item| {
                let title = item.get("title")?.as_str()?.to_string();
                let success_criteria = item
                    .get("success_criteria")
                    .and_then(Value::as_str)
                    .unwrap_or("")
                    .to_string();
                Some((title, success_criteria))
            })
            .enumerate()
            .map(|(ord, (title, success_criteria))| Checkpoint {
                goal_id: goal.id.clone(),
                ord: ord as u32,
                title,
                success_criteria,
                status: CheckpointStatus::Pending,
                attempts: 0,
                result_summary: String::new(),
            })
            .collect();

        if checkpoints.is_empty() {
            return Err(AgentError::Other(
                "goal decomposition produced no checkpoints".to_string(),
            ));
        }

        self.store.replace_checkpoints(&goal.id, &checkpoints).await?;
        goal.total_checkpoints = checkpoints.len() as u32;
        goal.current_checkpoint = 0;
        self.store.update_goal(goal).await?;
        Ok(checkpoints)
    }

    /// Active -> Paused. Returns false when the goal is not active.
    pub async fn pause_goal(&self, id: &str) -> Result<bool, StoreError> {
        self.transition(id, GoalStatus::Active, GoalStatus::Paused).await
    }

    /// Paused -> Active. Returns false when the goal is not paused.
    pub async fn resume_goal(&self, id: &str) -> Result<bool, StoreError> {
        self.transition(id, GoalStatus::Paused, GoalStatus::Active).await
    }

    /// Active or Paused -> Cancelled.
    pub async fn cancel_goal(&self, id: &str) -> Result<bool, StoreError> {
        let mut goal = self.store.get_goal(id).await?;
        if !matches!(goal.status, GoalStatus::Active | GoalStatus::Paused) {
            return Ok(false);
        }
        goal.status = GoalStatus::Cancelled;
        self.store.update_goal(&goal).await?;
        Ok(true)
    }

    async fn transition(
        &self,
        id: &str,
        from: GoalStatus,
        to: GoalStatus,
    ) -> Result<bool, StoreError> {
        let mut goal = self.store.get_goal(id).await?;
        if goal.status != from {
            return Ok(false);
        }
        goal.status = to;
        self.store.update_goal(&goal).await?;
        Ok(true)
    }
}

/// Find the first JSON array in `text` and parse it. Models wrap JSON in
/// prose and code fences often enough that strict parsing is not an option.
pub(crate) fn extract_json_array(text: &str) -> Option<Vec<Value>> {
    if let Ok(Value::Array(items)) = serde_json::from_str(text.trim()) {
        return Some(items);
    }
    let start = text.find('[')?;
    let mut depth = 0usize;
    for (offset, ch) in text[start..].char_indices() {
        match ch {
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    let candidate = &text[start..start + offset + 1];
                    if let Ok(Value::Array(items)) = serde_json::from_str(candidate) {
                        return Some(items);
                    }
                    return None;
                }
            }
            _ => {}
        }
    }
    None
}

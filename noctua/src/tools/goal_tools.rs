//! Goal tools: create, inspect, and manage long-running goals.
//!
//! Creation decomposes the goal into checkpoints and hands it to the goal
//! runner for background execution. Pause and cancel work through the
//! store: the runner reloads goal status between checkpoints and stops on
//! anything that is no longer `active`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::{Tool, ToolCallContext, ToolResult};
use crate::goals::{GoalCommand, GoalManager, GoalStatus};
use crate::permission::PermissionTier;
use crate::store::Store;

pub struct GoalCreateTool {
    manager: Arc<GoalManager>,
    commands: mpsc::Sender<GoalCommand>,
}

impl GoalCreateTool {
    pub fn new(manager: Arc<GoalManager>, commands: mpsc::Sender<GoalCommand>) -> Self {
        Self { manager, commands }
    }
}

#[async_trait]
impl Tool for GoalCreateTool {
    fn name(&self) -> &str {
        "goal_create"
    }

    fn description(&self) -> &str {
        "Start a long-running goal that spans multiple sessions. It is \
         decomposed into ordered checkpoints and executed step by step in \
         the background."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "goal": {"type": "string", "description": "The goal to achieve"},
            },
            "required": ["goal"],
        })
    }

    fn permission_tier(&self) -> PermissionTier {
        PermissionTier::Moderate
    }

    async fn execute(&self, params: Value, _ctx: &ToolCallContext) -> ToolResult {
        let goal_text = params
            .get("goal")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or("");
        if goal_text.is_empty() {
            return ToolResult::fail("goal text is required");
        }

        let mut goal = match self.manager.create_goal(goal_text).await {
            Ok(goal) => goal,
            Err(e) => return ToolResult::fail(format!("goal creation failed: {}", e)),
        };
        let checkpoints = match self.manager.decompose(&mut goal).await {
            Ok(cps) => cps,
            Err(e) => return ToolResult::fail(format!("goal decomposition failed: {}", e)),
        };

        let background = self
            .commands
            .send(GoalCommand::Start(goal.id.clone()))
            .await
            .is_ok();

        let checkpoint_list: Vec<Value> = checkpoints
            .iter()
            .map(|cp| {
                json!({
                    "order": cp.ord,
                    "title": cp.title,
                    "success_criteria": cp.success_criteria,
                })
            })
            .collect();

        ToolResult::ok(json!({
            "goal_id": goal.id,
            "goal": goal.goal,
            "status": goal.status.as_str(),
            "total_checkpoints": goal.total_checkpoints,
            "checkpoints": checkpoint_list,
            "background_execution": background,
        }))
    }
}

pub struct GoalStatusTool {
    store: Store,
}

impl GoalStatusTool {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for GoalStatusTool {
    fn name(&self) -> &str {
        "goal_status"
    }

    fn description(&self) -> &str {
        "Check progress on active or past goals: checkpoints, completion \
         status, and context summary."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "goal_id": {
                    "type": "string",
                    "description": "Specific goal to inspect; omit to list active and paused goals",
                },
            },
        })
    }

    fn permission_tier(&self) -> PermissionTier {
        PermissionTier::Safe
    }

    async fn execute(&self, params: Value, _ctx: &ToolCallContext) -> ToolResult {
        if let Some(goal_id) = params.get("goal_id").and_then(Value::as_str) {
            let goal = match self.store.get_goal(goal_id).await {
                Ok(goal) => goal,
                Err(e) => return ToolResult::fail(e.to_string()),
            };
            let checkpoints = self.store.load_checkpoints(goal_id).await.unwrap_or_default();
            let cps: Vec<Value> = checkpoints
                .iter()
                .map(|cp| {
                    json!({
                        "order": cp.ord,
                        "title": cp.title,
                        "status": cp.status.as_str(),
                        "attempts": cp.attempts,
                        "result_summary": cp.result_summary,
                    })
                })
                .collect();
            return ToolResult::ok(json!({
                "goal_id": goal.id,
                "goal": goal.goal,
                "status": goal.status.as_str(),
                "current_checkpoint": goal.current_checkpoint,
                "total_checkpoints": goal.total_checkpoints,
                "context_summary": goal.context_summary,
                "checkpoints": cps,
            }));
        }

        let mut goals = self
            .store
            .load_goals_by_status(GoalStatus::Active)
            .await
            .unwrap_or_default();
        goals.extend(
            self.store
                .load_goals_by_status(GoalStatus::Paused)
                .await
                .unwrap_or_default(),
        );
        let list: Vec<Value> = goals
            .iter()
            .map(|g| {
                json!({
                    "goal_id": g.id,
                    "goal": g.goal,
                    "status": g.status.as_str(),
                    "progress": format!("{}/{}", g.current_checkpoint, g.total_checkpoints),
                })
            })
            .collect();
        ToolResult::ok(json!({"goals": list}))
    }
}

pub struct GoalManageTool {
    manager: Arc<GoalManager>,
    commands: mpsc::Sender<GoalCommand>,
}

impl GoalManageTool {
    pub fn new(manager: Arc<GoalManager>, commands: mpsc::Sender<GoalCommand>) -> Self {
        Self { manager, commands }
    }
}

#[async_trait]
impl Tool for GoalManageTool {
    fn name(&self) -> &str {
        "goal_manage"
    }

    fn description(&self) -> &str {
        "Pause, resume, or cancel an active goal."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "goal_id": {"type": "string", "description": "The goal ID to manage"},
                "action": {
                    "type": "string",
                    "enum": ["pause", "resume", "cancel"],
                    "description": "Action to perform on the goal",
                },
            },
            "required": ["goal_id", "action"],
        })
    }

    fn permission_tier(&self) -> PermissionTier {
        PermissionTier::Moderate
    }

    async fn execute(&self, params: Value, _ctx: &ToolCallContext) -> ToolResult {
        let goal_id = params.get("goal_id").and_then(Value::as_str).unwrap_or("");
        let action = params.get("action").and_then(Value::as_str).unwrap_or("");

        let outcome = match action {
            "pause" => self.manager.pause_goal(goal_id).await,
            "resume" => match self.manager.resume_goal(goal_id).await {
                Ok(true) => {
                    let background = self
                        .commands
                        .send(GoalCommand::Resume(goal_id.to_string()))
                        .await
                        .is_ok();
                    return ToolResult::ok(json!({
                        "goal_id": goal_id,
                        "action": "resumed",
                        "background_execution": background,
                    }));
                }
                other => other,
            },
            "cancel" => self.manager.cancel_goal(goal_id).await,
            _ => return ToolResult::fail(format!("unknown action '{}'", action)),
        };

        match outcome {
            Ok(true) => ToolResult::ok(json!({"goal_id": goal_id, "action": format!("{}d", action)})),
            Ok(false) => ToolResult::fail(format!(
                "cannot {} (goal not in the right state or not found)",
                action
            )),
            Err(e) => ToolResult::fail(e.to_string()),
        }
    }
}

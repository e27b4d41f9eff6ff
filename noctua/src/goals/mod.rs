//! Long-running goals decomposed into ordered checkpoints.
//!
//! Goals live in the store and are leased by the [`runner`]; they survive
//! process restarts and resume at their current checkpoint.

mod manager;
mod runner;

pub use manager::GoalManager;
pub use runner::{GoalCommand, GoalRunner, GoalRunnerConfig};

use chrono::{DateTime, Utc};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GoalStatus {
    Active,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl GoalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            GoalStatus::Active => "active",
            GoalStatus::Paused => "paused",
            GoalStatus::Completed => "completed",
            GoalStatus::Failed => "failed",
            GoalStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(GoalStatus::Active),
            "paused" => Some(GoalStatus::Paused),
            "completed" => Some(GoalStatus::Completed),
            "failed" => Some(GoalStatus::Failed),
            "cancelled" => Some(GoalStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckpointStatus {
    Pending,
    Running,
    Complete,
    Failed,
}

impl CheckpointStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckpointStatus::Pending => "pending",
            CheckpointStatus::Running => "running",
            CheckpointStatus::Complete => "complete",
            CheckpointStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(CheckpointStatus::Pending),
            "running" => Some(CheckpointStatus::Running),
            "complete" => Some(CheckpointStatus::Complete),
            "failed" => Some(CheckpointStatus::Failed),
            _ => None,
        }
    }
}

/// A persistent multi-step goal.
#[derive(Clone, Debug)]
pub struct Goal {
    pub id: String,
    pub goal: String,
    pub status: GoalStatus,
    pub current_checkpoint: u32,
    pub total_checkpoints: u32,
    /// Rolling summary of what previous checkpoints produced; fed into the
    /// prompt of the next one.
    pub context_summary: String,
    pub llm_calls: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Goal {
    pub fn new(text: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            goal: text.into(),
            status: GoalStatus::Active,
            current_checkpoint: 0,
            total_checkpoints: 0,
            context_summary: String::new(),
            llm_calls: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One step of a decomposed goal.
#[derive(Clone, Debug)]
pub struct Checkpoint {
    pub goal_id: String,
    pub ord: u32,
    pub title: String,
    pub success_criteria: String,
    pub status: CheckpointStatus,
    pub attempts: u32,
    pub result_summary: String,
}

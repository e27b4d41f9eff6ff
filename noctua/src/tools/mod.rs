//! Tool system: the [`Tool`] trait, the registry and its views, and the
//! built-in tool set.

mod context;
pub mod fs;
pub mod goal_tools;
pub mod mind_tools;
mod protected;
mod registry;
pub mod schedule;
pub mod shell;
mod r#trait;
pub mod vault_tool;

pub use context::ToolCallContext;
pub use fs::{FileDeleteTool, FileListTool, FileMoveTool, FileReadTool, FileWriteTool};
pub use goal_tools::{GoalCreateTool, GoalManageTool, GoalStatusTool};
pub use mind_tools::{SetNextWakeupTool, UpdateScratchpadTool};
pub use protected::is_protected;
pub use r#trait::{Tool, ToolResult};
pub use registry::{SharedToolRegistry, TierCounts, ToolRegistry};
pub use schedule::ScheduleListTool;
pub use shell::ShellExecuteTool;
pub use vault_tool::{VaultGetTool, VaultSetTool};

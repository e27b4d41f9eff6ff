//! Scheduled-task listing. The cron engine lives outside the core; this
//! surfaces the persisted `scheduled_tasks` rows to the model.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{Tool, ToolCallContext, ToolResult};
use crate::permission::PermissionTier;
use crate::store::Store;

pub struct ScheduleListTool {
    store: Store,
}

impl ScheduleListTool {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ScheduleListTool {
    fn name(&self) -> &str {
        "schedule_list"
    }

    fn description(&self) -> &str {
        "List the persisted scheduled tasks (name, cron expression, tool, enabled)."
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    fn permission_tier(&self) -> PermissionTier {
        PermissionTier::Safe
    }

    async fn execute(&self, _params: Value, _ctx: &ToolCallContext) -> ToolResult {
        match self.store.list_scheduled_tasks().await {
            Ok(tasks) => {
                let list: Vec<Value> = tasks
                    .iter()
                    .map(|t| {
                        json!({
                            "id": t.id,
                            "name": t.name,
                            "cron": t.cron,
                            "tool_name": t.tool_name,
                            "enabled": t.enabled,
                        })
                    })
                    .collect();
                ToolResult::ok(json!({"tasks": list}))
            }
            Err(e) => ToolResult::fail(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_schedule_lists_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("db")).unwrap();
        let result = ScheduleListTool::new(store)
            .execute(json!({}), &ToolCallContext::default())
            .await;
        assert!(result.success);
        assert_eq!(result.data["tasks"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn lists_persisted_tasks() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path().join("db")).unwrap();
        store
            .add_scheduled_task(&crate::store::ScheduledTask {
                id: "st1".into(),
                name: "inbox sweep".into(),
                cron: "*/30 * * * *".into(),
                tool_name: "file_list".into(),
                params: "{}".into(),
                enabled: true,
            })
            .await
            .unwrap();

        let result = ScheduleListTool::new(store)
            .execute(json!({}), &ToolCallContext::default())
            .await;
        let tasks = result.data["tasks"].as_array().unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0]["name"], "inbox sweep");
    }
}

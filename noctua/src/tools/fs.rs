//! Filesystem tools: read, list, write, delete, move.
//!
//! Reads are SAFE (and on the static exemption list); writes and moves are
//! MODERATE; delete is DESTRUCTIVE. Every mutating tool refuses protected
//! paths before touching the disk.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{json, Value};

use super::protected::is_protected;
use super::{Tool, ToolCallContext, ToolResult};
use crate::permission::PermissionTier;

const MAX_READ_BYTES: u64 = 512 * 1024;

fn param_path(params: &Value, key: &str) -> Result<PathBuf, ToolResult> {
    match params.get(key).and_then(Value::as_str) {
        Some(p) if !p.is_empty() => Ok(PathBuf::from(p)),
        _ => Err(ToolResult::fail(format!("'{}' is required", key))),
    }
}

pub struct FileReadTool;

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "file_read"
    }

    fn description(&self) -> &str {
        "Read a text file and return its contents."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Path of the file to read"},
            },
            "required": ["path"],
        })
    }

    fn permission_tier(&self) -> PermissionTier {
        PermissionTier::Safe
    }

    async fn execute(&self, params: Value, _ctx: &ToolCallContext) -> ToolResult {
        let path = match param_path(&params, "path") {
            Ok(p) => p,
            Err(fail) => return fail,
        };
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.len() > MAX_READ_BYTES => {
                return ToolResult::fail(format!(
                    "file is {} bytes, larger than the {} byte read limit",
                    meta.len(),
                    MAX_READ_BYTES
                ))
            }
            Err(e) => return ToolResult::fail(format!("stat {}: {}", path.display(), e)),
            _ => {}
        }
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => ToolResult::ok(json!({
                "path": path.display().to_string(),
                "content": content,
            })),
            Err(e) => ToolResult::fail(format!("read {}: {}", path.display(), e)),
        }
    }
}

pub struct FileListTool;

#[async_trait]
impl Tool for FileListTool {
    fn name(&self) -> &str {
        "file_list"
    }

    fn description(&self) -> &str {
        "List the entries of a directory (names and kinds, non-recursive)."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Directory to list"},
            },
            "required": ["path"],
        })
    }

    fn permission_tier(&self) -> PermissionTier {
        PermissionTier::Safe
    }

    async fn execute(&self, params: Value, _ctx: &ToolCallContext) -> ToolResult {
        let path = match param_path(&params, "path") {
            Ok(p) => p,
            Err(fail) => return fail,
        };
        let mut entries = match tokio::fs::read_dir(&path).await {
            Ok(rd) => rd,
            Err(e) => return ToolResult::fail(format!("list {}: {}", path.display(), e)),
        };
        let mut names = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let kind = match entry.file_type().await {
                Ok(ft) if ft.is_dir() => "dir",
                Ok(_) => "file",
                Err(_) => "unknown",
            };
            names.push(json!({
                "name": entry.file_name().to_string_lossy(),
                "kind": kind,
            }));
        }
        names.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));
        ToolResult::ok(json!({"path": path.display().to_string(), "entries": names}))
    }
}

pub struct FileWriteTool {
    project_dir: PathBuf,
}

impl FileWriteTool {
    pub fn new(project_dir: impl AsRef<Path>) -> Self {
        Self {
            project_dir: project_dir.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl Tool for FileWriteTool {
    fn name(&self) -> &str {
        "file_write"
    }

    fn description(&self) -> &str {
        "Write content to a file, creating parent directories as needed."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Destination path"},
                "content": {"type": "string", "description": "Full file content"},
            },
            "required": ["path", "content"],
        })
    }

    fn permission_tier(&self) -> PermissionTier {
        PermissionTier::Moderate
    }

    async fn execute(&self, params: Value, _ctx: &ToolCallContext) -> ToolResult {
        let path = match param_path(&params, "path") {
            Ok(p) => p,
            Err(fail) => return fail,
        };
        if is_protected(&path, &self.project_dir) {
            return ToolResult::fail(format!("{} is protected", path.display()));
        }
        let content = params.get("content").and_then(Value::as_str).unwrap_or("");
        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return ToolResult::fail(format!("mkdir {}: {}", parent.display(), e));
            }
        }
        match tokio::fs::write(&path, content).await {
            Ok(()) => ToolResult::ok(json!({
                "path": path.display().to_string(),
                "bytes": content.len(),
            })),
            Err(e) => ToolResult::fail(format!("write {}: {}", path.display(), e)),
        }
    }
}

pub struct FileDeleteTool {
    project_dir: PathBuf,
}

impl FileDeleteTool {
    pub fn new(project_dir: impl AsRef<Path>) -> Self {
        Self {
            project_dir: project_dir.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl Tool for FileDeleteTool {
    fn name(&self) -> &str {
        "file_delete"
    }

    fn description(&self) -> &str {
        "Delete a single file (not a directory)."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "File to delete"},
            },
            "required": ["path"],
        })
    }

    fn permission_tier(&self) -> PermissionTier {
        PermissionTier::Destructive
    }

    async fn execute(&self, params: Value, _ctx: &ToolCallContext) -> ToolResult {
        let path = match param_path(&params, "path") {
            Ok(p) => p,
            Err(fail) => return fail,
        };
        if is_protected(&path, &self.project_dir) {
            return ToolResult::fail(format!("{} is protected", path.display()));
        }
        match tokio::fs::remove_file(&path).await {
            Ok(()) => ToolResult::ok(json!({"path": path.display().to_string()})),
            Err(e) => ToolResult::fail(format!("delete {}: {}", path.display(), e)),
        }
    }
}

pub struct FileMoveTool {
    project_dir: PathBuf,
}

impl FileMoveTool {
    pub fn new(project_dir: impl AsRef<Path>) -> Self {
        Self {
            project_dir: project_dir.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl Tool for FileMoveTool {
    fn name(&self) -> &str {
        "file_move"
    }

    fn description(&self) -> &str {
        "Move or rename a file."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "from": {"type": "string", "description": "Source path"},
                "to": {"type": "string", "description": "Destination path"},
            },
            "required": ["from", "to"],
        })
    }

    fn permission_tier(&self) -> PermissionTier {
        PermissionTier::Moderate
    }

    async fn execute(&self, params: Value, _ctx: &ToolCallContext) -> ToolResult {
        let from = match param_path(&params, "from") {
            Ok(p) => p,
            Err(fail) => return fail,
        };
        let to = match param_path(&params, "to") {
            Ok(p) => p,
            Err(fail) => return fail,
        };
        if is_protected(&from, &self.project_dir) || is_protected(&to, &self.project_dir) {
            return ToolResult::fail("source or destination is protected".to_string());
        }
        match tokio::fs::rename(&from, &to).await {
            Ok(()) => ToolResult::ok(json!({
                "from": from.display().to_string(),
                "to": to.display().to_string(),
            })),
            Err(e) => ToolResult::fail(format!("move: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn read_write_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("note.txt");
        let ctx = ToolCallContext::default();

        let write = FileWriteTool::new(dir.path());
        let result = write
            .execute(
                json!({"path": target.display().to_string(), "content": "hello"}),
                &ctx,
            )
            .await;
        assert!(result.success);

        let read = FileReadTool;
        let result = read
            .execute(json!({"path": target.display().to_string()}), &ctx)
            .await;
        assert!(result.success);
        assert_eq!(result.data["content"], "hello");
    }

    #[tokio::test]
    async fn write_refuses_protected_path() {
        let dir = tempfile::tempdir().unwrap();
        let vault = dir.path().join("vault.enc");
        std::fs::write(&vault, "sealed").unwrap();
        let ctx = ToolCallContext::default();

        let write = FileWriteTool::new(dir.path());
        let result = write
            .execute(
                json!({"path": vault.display().to_string(), "content": "overwrite"}),
                &ctx,
            )
            .await;
        assert!(!result.success);
        assert_eq!(std::fs::read_to_string(&vault).unwrap(), "sealed");
    }

    #[tokio::test]
    async fn delete_refuses_protected_path() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("noctua.db");
        std::fs::write(&db, "data").unwrap();
        let ctx = ToolCallContext::default();

        let delete = FileDeleteTool::new(dir.path());
        let result = delete
            .execute(json!({"path": db.display().to_string()}), &ctx)
            .await;
        assert!(!result.success);
        assert!(db.exists());
    }

    #[tokio::test]
    async fn list_returns_sorted_entries() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "").unwrap();
        std::fs::write(dir.path().join("a.txt"), "").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let ctx = ToolCallContext::default();

        let list = FileListTool;
        let result = list
            .execute(json!({"path": dir.path().display().to_string()}), &ctx)
            .await;
        assert!(result.success);
        let entries = result.data["entries"].as_array().unwrap();
        assert_eq!(entries[0]["name"], "a.txt");
        assert_eq!(entries[2]["kind"], "dir");
    }

    #[tokio::test]
    async fn missing_file_is_a_failed_result() {
        let ctx = ToolCallContext::default();
        let result = FileReadTool
            .execute(json!({"path": "/definitely/not/here"}), &ctx)
            .await;
        assert!(!result.success);
        assert!(result.error.is_some());
    }
}

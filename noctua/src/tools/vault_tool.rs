//! Vault tools: look up and store secrets from the encrypted vault.
//!
//! Both fail descriptively while the vault is locked; unlock failure is
//! never fatal to the process.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{Tool, ToolCallContext, ToolResult};
use crate::permission::PermissionTier;
use crate::vault::SharedVault;

pub struct VaultGetTool {
    vault: SharedVault,
}

impl VaultGetTool {
    pub fn new(vault: SharedVault) -> Self {
        Self { vault }
    }
}

#[async_trait]
impl Tool for VaultGetTool {
    fn name(&self) -> &str {
        "vault_get"
    }

    fn description(&self) -> &str {
        "Retrieve a stored credential from the encrypted vault by key."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "key": {"type": "string", "description": "Credential key, e.g. a domain name"},
            },
            "required": ["key"],
        })
    }

    fn permission_tier(&self) -> PermissionTier {
        PermissionTier::Moderate
    }

    async fn execute(&self, params: Value, _ctx: &ToolCallContext) -> ToolResult {
        let Some(key) = params.get("key").and_then(Value::as_str) else {
            return ToolResult::fail("'key' is required");
        };
        let vault = match self.vault.get() {
            Ok(v) => v,
            Err(e) => return ToolResult::fail(e.to_string()),
        };
        match vault.get(key) {
            Some(value) => ToolResult::ok(json!({"key": key, "value": value})),
            None => ToolResult::fail(format!("no vault entry for '{}'", key)),
        }
    }
}

pub struct VaultSetTool {
    vault: SharedVault,
}

impl VaultSetTool {
    pub fn new(vault: SharedVault) -> Self {
        Self { vault }
    }
}

#[async_trait]
impl Tool for VaultSetTool {
    fn name(&self) -> &str {
        "vault_set"
    }

    fn description(&self) -> &str {
        "Store a credential in the encrypted vault under a key."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "key": {"type": "string", "description": "Credential key"},
                "value": {"type": "object", "description": "Credential payload"},
            },
            "required": ["key", "value"],
        })
    }

    fn permission_tier(&self) -> PermissionTier {
        PermissionTier::Moderate
    }

    async fn execute(&self, params: Value, _ctx: &ToolCallContext) -> ToolResult {
        let Some(key) = params.get("key").and_then(Value::as_str) else {
            return ToolResult::fail("'key' is required");
        };
        if key.starts_with('_') {
            return ToolResult::fail("keys starting with '_' are reserved");
        }
        let Some(value) = params.get("value") else {
            return ToolResult::fail("'value' is required");
        };
        let vault = match self.vault.get() {
            Ok(v) => v,
            Err(e) => return ToolResult::fail(e.to_string()),
        };
        match vault.set(key, value.clone()) {
            Ok(()) => ToolResult::ok(json!({"key": key, "stored": true})),
            Err(e) => ToolResult::fail(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::Vault;
    use std::sync::Arc;

    #[tokio::test]
    async fn locked_vault_fails_descriptively() {
        let shared = SharedVault::new();
        let result = VaultGetTool::new(shared)
            .execute(json!({"key": "x"}), &ToolCallContext::default())
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("locked"));
    }

    #[tokio::test]
    async fn set_then_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let shared = SharedVault::new();
        shared.install(Arc::new(Vault::create(dir.path(), "pw").unwrap()));
        let ctx = ToolCallContext::default();

        let set = VaultSetTool::new(shared.clone())
            .execute(json!({"key": "site", "value": {"user": "me"}}), &ctx)
            .await;
        assert!(set.success);

        let get = VaultGetTool::new(shared)
            .execute(json!({"key": "site"}), &ctx)
            .await;
        assert!(get.success);
        assert_eq!(get.data["value"]["user"], "me");
    }

    #[tokio::test]
    async fn reserved_keys_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let shared = SharedVault::new();
        shared.install(Arc::new(Vault::create(dir.path(), "pw").unwrap()));
        let result = VaultSetTool::new(shared)
            .execute(
                json!({"key": "_agent_fingerprint", "value": {}}),
                &ToolCallContext::default(),
            )
            .await;
        assert!(!result.success);
    }
}

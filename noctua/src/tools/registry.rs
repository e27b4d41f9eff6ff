//! Tool registry: name to descriptor lookup plus the two derived views the
//! runtime needs, a compact schema list for the model and tier counts for
//! the runtime-state block, both filtered by the caller's authority.
//!
//! Visibility by authority: owner sees everything, trusted sees up to
//! destructive, public sees up to moderate. The registry is read-mostly;
//! hot registration (plugin load) takes the coarse write lock on
//! [`SharedToolRegistry`], reads clone `Arc`s out and never hold the lock
//! across a call.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::llm::ToolSchema;
use crate::permission::{Authority, PermissionTier};

use super::Tool;

/// Tool counts per permission tier, for the runtime-state block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TierCounts {
    pub total: usize,
    pub safe: usize,
    pub moderate: usize,
    pub destructive: usize,
    pub critical: usize,
}

fn max_visible_tier(authority: Authority) -> PermissionTier {
    match authority {
        Authority::Owner => PermissionTier::Critical,
        Authority::Trusted => PermissionTier::Destructive,
        Authority::Public => PermissionTier::Moderate,
    }
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Idempotent on name: a re-register replaces the
    /// previous descriptor.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Returns true when the tool existed.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.tools.remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Tools visible at `authority`, alphabetical for stable prompts.
    pub fn visible(&self, authority: Authority) -> Vec<Arc<dyn Tool>> {
        let max = max_visible_tier(authority);
        let mut tools: Vec<Arc<dyn Tool>> = self
            .tools
            .values()
            .filter(|t| t.permission_tier() <= max)
            .cloned()
            .collect();
        tools.sort_by(|a, b| a.name().cmp(b.name()));
        tools
    }

    /// Compact schema list for model consumption.
    pub fn schemas(&self, authority: Authority) -> Vec<ToolSchema> {
        self.visible(authority).iter().map(|t| t.schema()).collect()
    }

    pub fn counts(&self, authority: Authority) -> TierCounts {
        let mut counts = TierCounts::default();
        for tool in self.visible(authority) {
            counts.total += 1;
            match tool.permission_tier() {
                PermissionTier::Safe => counts.safe += 1,
                PermissionTier::Moderate => counts.moderate += 1,
                PermissionTier::Destructive => counts.destructive += 1,
                PermissionTier::Critical => counts.critical += 1,
            }
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Shared handle over the registry: coarse lock for updates, `Arc` clones
/// out for lock-free execution.
#[derive(Clone, Default)]
pub struct SharedToolRegistry {
    inner: Arc<RwLock<ToolRegistry>>,
}

impl SharedToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, tool: Arc<dyn Tool>) {
        self.inner.write().expect("registry lock").register(tool);
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.inner.write().expect("registry lock").unregister(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.inner.read().expect("registry lock").get(name)
    }

    pub fn schemas(&self, authority: Authority) -> Vec<ToolSchema> {
        self.inner.read().expect("registry lock").schemas(authority)
    }

    pub fn counts(&self, authority: Authority) -> TierCounts {
        self.inner.read().expect("registry lock").counts(authority)
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("registry lock").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{ToolCallContext, ToolResult};
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct FakeTool {
        name: &'static str,
        tier: PermissionTier,
    }

    #[async_trait]
    impl Tool for FakeTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "fake"
        }
        fn input_schema(&self) -> Value {
            json!({"type": "object"})
        }
        fn permission_tier(&self) -> PermissionTier {
            self.tier
        }
        async fn execute(&self, _params: Value, _ctx: &ToolCallContext) -> ToolResult {
            ToolResult::ok(json!({}))
        }
    }

    fn registry() -> ToolRegistry {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(FakeTool {
            name: "read",
            tier: PermissionTier::Safe,
        }));
        reg.register(Arc::new(FakeTool {
            name: "write",
            tier: PermissionTier::Moderate,
        }));
        reg.register(Arc::new(FakeTool {
            name: "shell",
            tier: PermissionTier::Destructive,
        }));
        reg.register(Arc::new(FakeTool {
            name: "self_modify",
            tier: PermissionTier::Critical,
        }));
        reg
    }

    #[test]
    fn register_is_idempotent_on_name() {
        let mut reg = ToolRegistry::new();
        reg.register(Arc::new(FakeTool {
            name: "read",
            tier: PermissionTier::Safe,
        }));
        reg.register(Arc::new(FakeTool {
            name: "read",
            tier: PermissionTier::Moderate,
        }));
        assert_eq!(reg.len(), 1);
        assert_eq!(
            reg.get("read").unwrap().permission_tier(),
            PermissionTier::Moderate
        );
    }

    #[test]
    fn visibility_filters_by_authority() {
        let reg = registry();
        assert_eq!(reg.counts(Authority::Owner).total, 4);
        assert_eq!(reg.counts(Authority::Trusted).total, 3);
        assert_eq!(reg.counts(Authority::Public).total, 2);

        let names: Vec<String> = reg
            .schemas(Authority::Public)
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["read", "write"]);
    }

    #[test]
    fn counts_split_by_tier() {
        let counts = registry().counts(Authority::Owner);
        assert_eq!(counts.safe, 1);
        assert_eq!(counts.moderate, 1);
        assert_eq!(counts.destructive, 1);
        assert_eq!(counts.critical, 1);
    }

    #[test]
    fn shared_registry_roundtrip() {
        let shared = SharedToolRegistry::new();
        shared.register(Arc::new(FakeTool {
            name: "read",
            tier: PermissionTier::Safe,
        }));
        assert!(shared.get("read").is_some());
        assert!(shared.unregister("read"));
        assert!(shared.get("read").is_none());
    }
}

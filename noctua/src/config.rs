//! Typed runtime configuration, read from the environment after the config
//! crate has layered `.env` and `config.toml` into it.

use std::path::PathBuf;
use std::time::Duration;

use crate::agent::AgentOptions;
use crate::llm::RouterBudget;
use crate::mind::MindConfig;
use crate::permission::PermissionMode;

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_list(key: &str) -> Vec<String> {
    std::env::var(key)
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    pub agent_name: String,
    pub project_dir: PathBuf,
    pub gateway_addr: String,
    /// When set, adapters must authenticate with an `auth` command before
    /// anything else.
    pub gateway_token: Option<String>,
    pub permission_mode: PermissionMode,
    pub max_sessions: usize,
    pub session_timeout_hours: i64,
    pub vault_password: Option<String>,
    /// User ids granted owner authority; empty means every user is owner
    /// (single-operator local setup).
    pub owner_user_ids: Vec<String>,
    /// User ids granted trusted authority; everyone else is public when an
    /// owner list exists.
    pub trusted_user_ids: Vec<String>,
    pub primary_provider: String,
    pub openai_model: String,
    pub anthropic_model: String,
    pub budget: RouterBudget,
    pub mind: MindConfig,
    pub agent: AgentOptions,
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let mode = env_opt("NOCTUA_PERMISSION_MODE")
            .and_then(|v| PermissionMode::parse(&v))
            .unwrap_or(PermissionMode::SmartAuto);

        Self {
            agent_name: env_string("NOCTUA_AGENT_NAME", "noctua"),
            project_dir: PathBuf::from(env_string("NOCTUA_PROJECT_DIR", ".")),
            gateway_addr: env_string("NOCTUA_GATEWAY_ADDR", "127.0.0.1:18789"),
            gateway_token: env_opt("NOCTUA_GATEWAY_TOKEN"),
            permission_mode: mode,
            max_sessions: env_parse("NOCTUA_MAX_SESSIONS", 64),
            session_timeout_hours: env_parse("NOCTUA_SESSION_TIMEOUT_HOURS", 12),
            vault_password: env_opt("NOCTUA_VAULT_PASSWORD"),
            owner_user_ids: env_list("NOCTUA_OWNER_IDS"),
            trusted_user_ids: env_list("NOCTUA_TRUSTED_IDS"),
            primary_provider: env_string("NOCTUA_PRIMARY_PROVIDER", "openai"),
            openai_model: env_string("NOCTUA_OPENAI_MODEL", "gpt-4o-mini"),
            anthropic_model: env_string("NOCTUA_ANTHROPIC_MODEL", "claude-sonnet-4"),
            budget: RouterBudget {
                per_task_usd: env_parse("NOCTUA_TASK_BUDGET_USD", 0.50),
                daily_usd: env_parse("NOCTUA_DAILY_BUDGET_USD", 10.0),
            },
            mind: MindConfig {
                daily_budget: env_parse("NOCTUA_MIND_DAILY_BUDGET", 50),
                default_wakeup_secs: env_parse("NOCTUA_MIND_WAKEUP_SECS", 300),
                ..Default::default()
            },
            agent: AgentOptions {
                max_steps: env_parse("NOCTUA_MAX_STEPS", 24),
                max_time: Duration::from_secs(env_parse("NOCTUA_MAX_TIME_SECS", 600)),
                history_window: env_parse("NOCTUA_HISTORY_WINDOW", 40),
            },
        }
    }

    /// In-memory defaults rooted at `dir`; used by tests and the one-shot
    /// chat command.
    pub fn for_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            agent_name: "noctua".to_string(),
            project_dir: dir.into(),
            gateway_addr: "127.0.0.1:0".to_string(),
            gateway_token: None,
            permission_mode: PermissionMode::SmartAuto,
            max_sessions: 64,
            session_timeout_hours: 12,
            vault_password: None,
            owner_user_ids: Vec::new(),
            trusted_user_ids: Vec::new(),
            primary_provider: "openai".to_string(),
            openai_model: "gpt-4o-mini".to_string(),
            anthropic_model: "claude-sonnet-4".to_string(),
            budget: RouterBudget::default(),
            mind: MindConfig::default(),
            agent: AgentOptions::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_env() {
        let config = RuntimeConfig::for_dir("/tmp/x");
        assert_eq!(config.gateway_addr, "127.0.0.1:0");
        assert_eq!(config.permission_mode, PermissionMode::SmartAuto);
        assert_eq!(config.max_sessions, 64);
    }

    #[test]
    fn env_list_splits_and_trims() {
        std::env::set_var("NOCTUA_CFG_LIST_TEST", "a, b ,,c");
        assert_eq!(env_list("NOCTUA_CFG_LIST_TEST"), vec!["a", "b", "c"]);
        std::env::remove_var("NOCTUA_CFG_LIST_TEST");
    }
}

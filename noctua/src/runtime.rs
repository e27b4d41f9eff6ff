//! Runtime assembly: boot order, background tasks, and the operations the
//! gateway command surface calls into.
//!
//! Boot: store, vault (unlock failure is non-fatal), fingerprint, router,
//! sessions, tool registry with the builtin set, agent runner, mind, goal
//! runner. `start_background` spawns the mind, the goal runner (resuming
//! any goal left `active` by a previous process), and the idle-session
//! sweep.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::agent::{AgentRunner, ChatRequest, GatedExecutor};
use crate::approval::ApprovalQueue;
use crate::config::RuntimeConfig;
use crate::error::{AgentError, VaultError};
use crate::fingerprint::{self, FingerprintStatus};
use crate::goals::{GoalCommand, GoalManager, GoalRunner, GoalRunnerConfig, GoalStatus};
use crate::llm::{AnthropicClient, Candidate, LlmClient, LlmRouter, OpenAiClient, RouteTable};
use crate::mind::{ActivityMonitor, AutonomousMind, MindHandle};
use crate::permission::{Authority, PermissionMode};
use crate::runtime_state::ContextMode;
use crate::session::SessionManager;
use crate::sink::SharedSink;
use crate::store::Store;
use crate::tools::{
    FileDeleteTool, FileListTool, FileMoveTool, FileReadTool, FileWriteTool, GoalCreateTool,
    GoalManageTool, GoalStatusTool, ScheduleListTool, SetNextWakeupTool, SharedToolRegistry,
    ShellExecuteTool, UpdateScratchpadTool, VaultGetTool, VaultSetTool,
};
use crate::vault::{SharedVault, Vault};

pub struct Runtime {
    pub config: RuntimeConfig,
    pub store: Store,
    pub sessions: Arc<SessionManager>,
    pub registry: SharedToolRegistry,
    pub approvals: Arc<ApprovalQueue>,
    pub router: Arc<LlmRouter>,
    pub sink: SharedSink,
    pub vault: SharedVault,
    pub fingerprint: String,
    pub fingerprint_status: FingerprintStatus,
    pub agent: Arc<AgentRunner>,
    pub activity: Arc<ActivityMonitor>,
    pub mind_handle: Arc<MindHandle>,
    pub goal_manager: Arc<GoalManager>,
    pub goal_commands: mpsc::Sender<GoalCommand>,
    mind: Arc<AutonomousMind>,
    goal_runner: Mutex<Option<GoalRunner>>,
    in_flight: DashMap<String, CancellationToken>,
    shutdown: CancellationToken,
}

impl Runtime {
    /// Boot with provider clients read from the environment.
    pub async fn boot(config: RuntimeConfig) -> Result<Arc<Self>, AgentError> {
        let mut clients: Vec<Arc<dyn LlmClient>> = Vec::new();
        if std::env::var("OPENAI_API_KEY").is_ok() {
            clients.push(Arc::new(OpenAiClient::new()));
        }
        if let Some(anthropic) = AnthropicClient::from_env() {
            clients.push(Arc::new(anthropic));
        }
        let routes = default_routes(&config, &clients);
        Self::boot_with(config, clients, routes).await
    }

    /// Boot with explicit clients and routes (tests, custom wiring).
    pub async fn boot_with(
        config: RuntimeConfig,
        clients: Vec<Arc<dyn LlmClient>>,
        routes: RouteTable,
    ) -> Result<Arc<Self>, AgentError> {
        std::fs::create_dir_all(&config.project_dir)
            .map_err(|e| AgentError::Other(format!("project dir: {}", e)))?;
        let store = Store::new(config.project_dir.join("noctua.db"))?;

        // Vault unlock failure is fatal only to operations needing secrets.
        let vault = SharedVault::new();
        if let Some(password) = &config.vault_password {
            match open_vault(&config, password) {
                Ok(unlocked) => vault.install(Arc::new(unlocked)),
                Err(e) => tracing::warn!("vault unavailable: {}", e),
            }
        }

        let (fingerprint, fingerprint_status) = match vault.get() {
            Ok(unlocked) => {
                let config_hash = fingerprint::compute_config_hash(
                    &config.agent_name,
                    &config.project_dir,
                    config.permission_mode.as_str(),
                );
                let salt_hash = fingerprint::compute_salt_hash(&config.project_dir);
                fingerprint::get_or_create(&unlocked, &config_hash, &salt_hash)
            }
            Err(_) => (String::new(), FingerprintStatus::Unavailable),
        };

        let mut router = LlmRouter::new(routes, config.budget).with_store(store.clone());
        for client in clients {
            router = router.register_client(client);
        }
        let router = Arc::new(router);

        let sessions = Arc::new(SessionManager::new(
            Some(store.clone()),
            config.max_sessions,
            config.session_timeout_hours,
        ));
        let approvals = Arc::new(ApprovalQueue::default());
        let sink = SharedSink::new();
        let activity = Arc::new(ActivityMonitor::new());
        let mind_handle = MindHandle::new(&config.mind);
        let goal_manager = Arc::new(GoalManager::new(store.clone(), Arc::clone(&router)));

        let registry = SharedToolRegistry::new();
        let gate = GatedExecutor::new(registry.clone(), Arc::clone(&approvals), sink.clone());

        let agent = Arc::new(AgentRunner::new(
            Arc::clone(&router),
            gate.clone(),
            Arc::clone(&sessions),
            Arc::clone(&approvals),
            config.agent.clone(),
            fingerprint.clone(),
            fingerprint_status,
            config.max_sessions,
        ));

        let (goal_runner, goal_commands) = GoalRunner::new(
            store.clone(),
            Arc::clone(&agent),
            sink.clone(),
            Arc::clone(&activity),
            GoalRunnerConfig::default(),
        );

        let scratchpad = config.project_dir.join("scratchpad.md");
        register_builtin_tools(
            &registry,
            &config,
            &store,
            &vault,
            &mind_handle,
            &goal_manager,
            &goal_commands,
            &scratchpad,
        );

        let mind = Arc::new(AutonomousMind::new(
            Arc::clone(&router),
            gate,
            store.clone(),
            sink.clone(),
            Arc::clone(&mind_handle),
            Arc::clone(&activity),
            scratchpad,
            config.mind,
        ));

        Ok(Arc::new(Self {
            config,
            store,
            sessions,
            registry,
            approvals,
            router,
            sink,
            vault,
            fingerprint,
            fingerprint_status,
            agent,
            activity,
            mind_handle,
            goal_manager,
            goal_commands,
            mind,
            goal_runner: Mutex::new(Some(goal_runner)),
            in_flight: DashMap::new(),
            shutdown: CancellationToken::new(),
        }))
    }

    /// Spawn the mind, the goal runner, goal resumption, and the idle
    /// session sweep. Call once after boot.
    pub fn start_background(self: &Arc<Self>) {
        let mind = Arc::clone(&self.mind);
        tokio::spawn(mind.run(self.shutdown.child_token()));

        if let Some(runner) = self.goal_runner.lock().expect("goal runner lock").take() {
            tokio::spawn(runner.run(self.shutdown.child_token()));
        }

        let runtime = Arc::clone(self);
        tokio::spawn(async move {
            match runtime.store.load_goals_by_status(GoalStatus::Active).await {
                Ok(goals) => {
                    for goal in goals {
                        tracing::info!(goal = %goal.id, "resuming goal from previous run");
                        let _ = runtime
                            .goal_commands
                            .send(GoalCommand::Resume(goal.id))
                            .await;
                    }
                }
                Err(e) => tracing::warn!("goal resumption scan failed: {}", e),
            }
        });

        let runtime = Arc::clone(self);
        tokio::spawn(async move {
            let cancel = runtime.shutdown.child_token();
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_secs(600)) => {
                        let swept = runtime.sessions.sweep_idle();
                        if swept > 0 {
                            tracing::info!(swept, "expired idle sessions");
                        }
                    }
                }
            }
        });
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn authority_for(&self, user_id: &str) -> Authority {
        if self.config.owner_user_ids.is_empty()
            || self.config.owner_user_ids.iter().any(|id| id == user_id)
        {
            Authority::Owner
        } else if self.config.trusted_user_ids.iter().any(|id| id == user_id) {
            Authority::Trusted
        } else {
            Authority::Public
        }
    }

    /// Run one inbound chat end to end: session binding, per-session
    /// ordering (the session lock is held for the whole loop), mode
    /// resolution, cancellation registration. Returns the bound session id
    /// and the final reply.
    pub async fn handle_chat(
        &self,
        content: &str,
        session_id: &str,
        channel: &str,
        user_id: &str,
    ) -> Result<(String, String), AgentError> {
        self.activity.touch();

        let (id, session) = self
            .sessions
            .get_or_create(session_id, user_id, channel)
            .await;
        let mut guard = session.lock().await;

        let mode = guard.mode_override.unwrap_or(self.config.permission_mode);
        let cancel = CancellationToken::new();
        self.in_flight.insert(id.clone(), cancel.clone());

        let request = ChatRequest {
            content: content.to_string(),
            session_id: id.clone(),
            channel: channel.to_string(),
            authority: self.authority_for(user_id),
            mode,
            context: ContextMode::UserChat,
            task_id: format!("chat-{}", uuid::Uuid::new_v4()),
            cancel,
        };

        let result = self.agent.run_chat(&mut guard, &request).await;
        self.in_flight.remove(&id);
        result.map(|reply| (id, reply))
    }

    /// Re-initialize the agent in place: cancel every in-flight chat, drop
    /// in-memory session state (durable turns reload on demand), and
    /// re-enable the mind. The vault, router, and registry stay as booted.
    pub async fn restart_in_place(&self) {
        for entry in self.in_flight.iter() {
            entry.value().cancel();
        }
        self.in_flight.clear();
        self.sessions.reset();
        self.mind_handle.set_enabled(true);
        tracing::info!("agent re-initialized in place");
    }

    /// Raise cancellation on the in-flight chat of a session.
    pub fn cancel_chat(&self, session_id: &str) -> bool {
        match self.in_flight.get(session_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Session-scoped permission mode override (kept on the session and in
    /// the session row).
    pub async fn set_session_mode(&self, session_id: &str, mode: Option<PermissionMode>) -> bool {
        let Some(session) = self.sessions.get(session_id) else {
            return false;
        };
        let mut guard = session.lock().await;
        guard.mode_override = mode;
        let _ = self
            .store
            .upsert_session(
                session_id,
                &guard.user_id,
                &guard.channel,
                mode.map(|m| m.as_str()),
            )
            .await;
        true
    }

    /// `status` command payload: tool counts, providers, costs, gauges.
    pub fn status_snapshot(&self) -> Value {
        let counts = self.registry.counts(Authority::Owner);
        let costs = self.router.costs();
        json!({
            "agent": self.config.agent_name,
            "fingerprint_status": self.fingerprint_status.as_str(),
            "tools": {
                "total": counts.total,
                "safe": counts.safe,
                "moderate": counts.moderate,
                "destructive": counts.destructive,
                "critical": counts.critical,
            },
            "providers": self.router.providers(),
            "cost_usd": {
                "today": costs.spent_today(),
                "total": costs.total_usd(),
            },
            "sessions_active": self.sessions.active_count(),
            "approvals_pending": self.approvals.len(),
            "mind": {
                "enabled": self.mind_handle.is_enabled(),
                "phase": self.mind_handle.phase().as_str(),
                "budget_remaining": self.mind_handle.budget_remaining(),
                "next_wakeup_seconds": self.mind_handle.next_wakeup_secs(),
            },
        })
    }

    /// `health` command payload: per-provider transparency stats.
    pub fn health_snapshot(&self) -> Value {
        let stats = self.router.tracker().provider_stats();
        let mut providers = serde_json::Map::new();
        for (name, s) in stats {
            providers.insert(
                name,
                json!({
                    "total_calls": s.total_calls,
                    "failures": s.failures,
                    "truncations": s.truncations,
                    "content_filters": s.content_filters,
                    "fallbacks_to": s.fallbacks_to,
                    "avg_latency_ms": s.avg_latency_ms(),
                }),
            );
        }
        Value::Object(providers)
    }
}

fn open_vault(config: &RuntimeConfig, password: &str) -> Result<Vault, VaultError> {
    if Vault::exists(&config.project_dir) {
        Vault::unlock(&config.project_dir, password)
    } else {
        Vault::create(&config.project_dir, password)
    }
}

fn default_routes(config: &RuntimeConfig, clients: &[Arc<dyn LlmClient>]) -> RouteTable {
    let mut candidates: Vec<Candidate> = clients
        .iter()
        .map(|c| match c.provider() {
            "anthropic" => Candidate::new("anthropic", &config.anthropic_model),
            other => Candidate::new(other, &config.openai_model),
        })
        .collect();
    candidates.sort_by_key(|c| c.provider != config.primary_provider);
    RouteTable::uniform(candidates)
}

#[allow(clippy::too_many_arguments)]
fn register_builtin_tools(
    registry: &SharedToolRegistry,
    config: &RuntimeConfig,
    store: &Store,
    vault: &SharedVault,
    mind_handle: &Arc<MindHandle>,
    goal_manager: &Arc<GoalManager>,
    goal_commands: &mpsc::Sender<GoalCommand>,
    scratchpad: &std::path::Path,
) {
    registry.register(Arc::new(FileReadTool));
    registry.register(Arc::new(FileListTool));
    registry.register(Arc::new(FileWriteTool::new(&config.project_dir)));
    registry.register(Arc::new(FileDeleteTool::new(&config.project_dir)));
    registry.register(Arc::new(FileMoveTool::new(&config.project_dir)));
    registry.register(Arc::new(ShellExecuteTool::new()));
    registry.register(Arc::new(VaultGetTool::new(vault.clone())));
    registry.register(Arc::new(VaultSetTool::new(vault.clone())));
    registry.register(Arc::new(UpdateScratchpadTool::new(scratchpad.to_path_buf())));
    registry.register(Arc::new(SetNextWakeupTool::new(Arc::clone(mind_handle))));
    registry.register(Arc::new(GoalCreateTool::new(
        Arc::clone(goal_manager),
        goal_commands.clone(),
    )));
    registry.register(Arc::new(GoalStatusTool::new(store.clone())));
    registry.register(Arc::new(GoalManageTool::new(
        Arc::clone(goal_manager),
        goal_commands.clone(),
    )));
    registry.register(Arc::new(ScheduleListTool::new(store.clone())));
}

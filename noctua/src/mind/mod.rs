//! The autonomous mind: a timer-driven background reasoner that advances
//! persistent state while no user conversation is active.
//!
//! Modeled as an explicit state machine, Sleeping -> Thinking -> Sleeping,
//! with a Paused detour whenever user activity is seen. Any inbound chat
//! touches the [`ActivityMonitor`]; the mind checks it between cycles and
//! between tool invocations and yields until the user has been idle for
//! the resume window. One cycle: load scratchpad, compose a planning
//! prompt, run the model's tool calls through the same permission gate as
//! the agent loop (authority `trusted`, mode `smart_auto`), and let the
//! scratchpad and wakeup tools persist the new state. A daily cycle budget
//! bounds spend; when it runs out the mind sleeps until the next day.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::agent::GatedExecutor;
use crate::llm::{LlmRouter, TaskType};
use crate::message::Message;
use crate::permission::{Authority, PermissionMode};
use crate::sink::SharedSink;
use crate::store::Store;
use crate::tools::ToolCallContext;

const SCRATCHPAD_PREVIEW_CHARS: usize = 2000;

#[derive(Clone, Copy, Debug)]
pub struct MindConfig {
    pub min_wakeup_secs: u64,
    pub max_wakeup_secs: u64,
    pub default_wakeup_secs: u64,
    /// Think cycles per day.
    pub daily_budget: u32,
    /// How long the user must be idle before a paused mind resumes.
    pub resume_idle: Duration,
}

impl Default for MindConfig {
    fn default() -> Self {
        Self {
            min_wakeup_secs: 60,
            max_wakeup_secs: 3600,
            default_wakeup_secs: 300,
            daily_budget: 50,
            resume_idle: Duration::from_secs(120),
        }
    }
}

/// User-activity signal shared by the gateway (writer), the mind, and the
/// goal runner (readers). Uses the tokio clock so paused-time tests drive
/// it deterministically.
#[derive(Default)]
pub struct ActivityMonitor {
    last_chat: Mutex<Option<tokio::time::Instant>>,
}

impl ActivityMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called by the gateway for every inbound CHAT.
    pub fn touch(&self) {
        *self.last_chat.lock().expect("activity lock") = Some(tokio::time::Instant::now());
    }

    pub fn active_within(&self, window: Duration) -> bool {
        self.last_chat
            .lock()
            .expect("activity lock")
            .map(|t| t.elapsed() < window)
            .unwrap_or(false)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MindPhase {
    Sleeping,
    Thinking,
    Paused,
}

impl MindPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            MindPhase::Sleeping => "sleeping",
            MindPhase::Thinking => "thinking",
            MindPhase::Paused => "paused",
        }
    }
}

/// Control surface shared with the wakeup tool and the `mind` command.
pub struct MindHandle {
    next_wakeup_secs: AtomicU64,
    enabled: AtomicBool,
    budget_remaining: AtomicU32,
    phase: Mutex<MindPhase>,
    last_action: Mutex<String>,
    min_wakeup_secs: u64,
    max_wakeup_secs: u64,
}

impl MindHandle {
    pub fn new(config: &MindConfig) -> Arc<Self> {
        Arc::new(Self {
            next_wakeup_secs: AtomicU64::new(config.default_wakeup_secs),
            enabled: AtomicBool::new(true),
            budget_remaining: AtomicU32::new(config.daily_budget),
            phase: Mutex::new(MindPhase::Sleeping),
            last_action: Mutex::new(String::new()),
            min_wakeup_secs: config.min_wakeup_secs,
            max_wakeup_secs: config.max_wakeup_secs,
        })
    }

    /// Clamped to the configured [min, max] window.
    pub fn set_next_wakeup(&self, seconds: u64) -> u64 {
        let clamped = seconds.clamp(self.min_wakeup_secs, self.max_wakeup_secs);
        self.next_wakeup_secs.store(clamped, Ordering::SeqCst);
        clamped
    }

    pub fn next_wakeup_secs(&self) -> u64 {
        self.next_wakeup_secs.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn budget_remaining(&self) -> u32 {
        self.budget_remaining.load(Ordering::SeqCst)
    }

    pub fn phase(&self) -> MindPhase {
        *self.phase.lock().expect("phase lock")
    }

    pub fn last_action(&self) -> String {
        self.last_action.lock().expect("action lock").clone()
    }

    fn set_phase(&self, phase: MindPhase) {
        *self.phase.lock().expect("phase lock") = phase;
    }

    fn set_last_action(&self, action: &str) {
        *self.last_action.lock().expect("action lock") = action.to_string();
    }
}

pub struct AutonomousMind {
    router: Arc<LlmRouter>,
    gate: GatedExecutor,
    store: Store,
    sink: SharedSink,
    handle: Arc<MindHandle>,
    activity: Arc<ActivityMonitor>,
    scratchpad_path: PathBuf,
    config: MindConfig,
    budget_day: Mutex<NaiveDate>,
    cycle_counter: AtomicU64,
}

impl AutonomousMind {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        router: Arc<LlmRouter>,
        gate: GatedExecutor,
        store: Store,
        sink: SharedSink,
        handle: Arc<MindHandle>,
        activity: Arc<ActivityMonitor>,
        scratchpad_path: PathBuf,
        config: MindConfig,
    ) -> Self {
        Self {
            router,
            gate,
            store,
            sink,
            handle,
            activity,
            scratchpad_path,
            config,
            budget_day: Mutex::new(Utc::now().date_naive()),
            cycle_counter: AtomicU64::new(0),
        }
    }

    pub fn handle(&self) -> Arc<MindHandle> {
        Arc::clone(&self.handle)
    }

    /// Run until cancelled. One [`tick`](Self::tick) per wakeup.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        tracing::info!("autonomous mind started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.tick(&cancel) => {}
            }
            if cancel.is_cancelled() {
                break;
            }
        }
        tracing::info!("autonomous mind stopped");
    }

    /// One wakeup: sleep, then pause / budget checks, then a think cycle.
    pub async fn tick(&self, cancel: &CancellationToken) {
        self.handle.set_phase(MindPhase::Sleeping);
        let sleep_secs = self.handle.next_wakeup_secs();
        tokio::time::sleep(Duration::from_secs(sleep_secs)).await;

        if cancel.is_cancelled() || !self.handle.is_enabled() {
            return;
        }

        self.reset_budget_on_new_day();

        if self.activity.active_within(self.config.resume_idle) {
            self.pause_until_idle(cancel).await;
            if cancel.is_cancelled() {
                return;
            }
        }

        if self.handle.budget_remaining() == 0 {
            self.sleep_until_tomorrow();
            return;
        }

        self.handle.set_phase(MindPhase::Thinking);
        self.emit("mind_wakeup", json!({"budget_remaining": self.handle.budget_remaining()}));

        match self.cycle(cancel).await {
            Ok(summary) => {
                self.handle.set_last_action(&summary);
                self.emit("mind_action", json!({"summary": summary}));
            }
            Err(detail) => {
                tracing::warn!("mind cycle failed: {}", detail);
                self.emit("mind_error", json!({"detail": crate::scrub::scrub(&detail)}));
            }
        }

        self.handle.budget_remaining.fetch_sub(1, Ordering::SeqCst);
        self.emit(
            "mind_sleep",
            json!({"next_wakeup_seconds": self.handle.next_wakeup_secs()}),
        );
    }

    /// User is active: announce the pause once, then yield until the idle
    /// window has passed.
    async fn pause_until_idle(&self, cancel: &CancellationToken) {
        self.handle.set_phase(MindPhase::Paused);
        self.emit("mind_paused", json!({}));
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(Duration::from_secs(5)) => {}
            }
            if !self.activity.active_within(self.config.resume_idle) {
                break;
            }
        }
        self.emit("mind_resumed", json!({}));
    }

    fn reset_budget_on_new_day(&self) {
        let today = Utc::now().date_naive();
        let mut day = self.budget_day.lock().expect("budget day lock");
        if *day != today {
            *day = today;
            self.handle
                .budget_remaining
                .store(self.config.daily_budget, Ordering::SeqCst);
        }
    }

    fn sleep_until_tomorrow(&self) {
        let now = Utc::now();
        let tomorrow = (now + chrono::Duration::days(1))
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .expect("midnight");
        let secs = (tomorrow - now.naive_utc()).num_seconds().max(60) as u64;
        self.handle.next_wakeup_secs.store(secs, Ordering::SeqCst);
        self.emit("mind_sleep", json!({"next_wakeup_seconds": secs, "reason": "daily budget exhausted"}));
    }

    /// One think cycle. Returns a short summary for `mind_action`.
    async fn cycle(&self, cancel: &CancellationToken) -> Result<String, String> {
        let scratchpad = tokio::fs::read_to_string(&self.scratchpad_path)
            .await
            .unwrap_or_default();
        let preview: String = scratchpad.chars().take(SCRATCHPAD_PREVIEW_CHARS).collect();

        let goals = self
            .store
            .load_goals_by_status(crate::goals::GoalStatus::Active)
            .await
            .unwrap_or_default();
        let goal_lines: Vec<String> = goals
            .iter()
            .map(|g| {
                format!(
                    "- [{}] {} (checkpoint {}/{})",
                    g.id, g.goal, g.current_checkpoint, g.total_checkpoints
                )
            })
            .collect();

        let prompt = format!(
            "Autonomous think cycle. You are awake between conversations.\n\n\
             Scratchpad:\n{}\n\n\
             Last action: {}\n\
             Cycles remaining today: {}\n\
             Active goals:\n{}\n\n\
             Do one useful unit of work with your tools. Before finishing, \
             call update_scratchpad with the new state of your working memory \
             and set_next_wakeup for when to wake again.",
            if preview.is_empty() { "(empty)" } else { preview.as_str() },
            {
                let last = self.handle.last_action();
                if last.is_empty() {
                    "(none)".to_string()
                } else {
                    last
                }
            },
            self.handle.budget_remaining(),
            if goal_lines.is_empty() {
                "(none)".to_string()
            } else {
                goal_lines.join("\n")
            },
        );

        let cycle_id = self.cycle_counter.fetch_add(1, Ordering::SeqCst);
        let task_id = format!("mind-{}", cycle_id);
        let schemas = self.gate.registry().schemas(Authority::Trusted);
        let messages = [Message::user(prompt)];

        let completion = self
            .router
            .complete(TaskType::Planning, &task_id, &messages, &schemas)
            .await
            .map_err(|e| e.to_string())?;

        let ctx = ToolCallContext::new("", "mind", Authority::Trusted)
            .with_cancel(cancel.child_token());

        let mut tool_names = Vec::new();
        for call in &completion.tool_calls {
            // User activity preempts the cycle between tool invocations.
            if self.activity.active_within(self.config.resume_idle) {
                tracing::debug!("user active, cutting mind cycle short");
                break;
            }
            if cancel.is_cancelled() {
                break;
            }
            self.emit("mind_tool_use", json!({"tool_name": call.name}));
            let result = self
                .gate
                .run_tool_call(call, PermissionMode::SmartAuto, &ctx)
                .await;
            if !result.success {
                tracing::debug!(tool = %call.name, "mind tool failed: {:?}", result.error);
            }
            tool_names.push(call.name.clone());
        }

        Ok(if completion.content.is_empty() {
            format!("ran tools: {}", tool_names.join(", "))
        } else {
            completion.content.chars().take(200).collect()
        })
    }

    fn emit(&self, event: &str, detail: serde_json::Value) {
        self.sink.broadcast(wire::event(event, detail, ""));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::ApprovalQueue;
    use crate::llm::{
        Candidate, FinishReason, LlmCompletion, LlmUsage, MockLlm, RouteTable, RouterBudget,
        ToolCall,
    };
    use crate::sink::test_support::RecordingSink;
    use crate::tools::mind_tools::{SetNextWakeupTool, UpdateScratchpadTool};
    use crate::tools::SharedToolRegistry;
    use tempfile::TempDir;

    struct Fixture {
        mind: Arc<AutonomousMind>,
        mock: Arc<MockLlm>,
        sink: Arc<RecordingSink>,
        handle: Arc<MindHandle>,
        activity: Arc<ActivityMonitor>,
        scratchpad: PathBuf,
        _dir: TempDir,
    }

    fn fixture(config: MindConfig) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let scratchpad = dir.path().join("scratchpad.md");
        let store = Store::new(dir.path().join("noctua.db")).unwrap();

        let mock = Arc::new(MockLlm::new());
        let router = Arc::new(
            crate::llm::LlmRouter::new(
                RouteTable::uniform(vec![Candidate::new("mock", "mock-model")]),
                RouterBudget::default(),
            )
            .register_client(Arc::clone(&mock) as Arc<dyn crate::llm::LlmClient>),
        );

        let handle = MindHandle::new(&config);
        let registry = SharedToolRegistry::new();
        registry.register(Arc::new(UpdateScratchpadTool::new(scratchpad.clone())));
        registry.register(Arc::new(SetNextWakeupTool::new(Arc::clone(&handle))));

        let approvals = Arc::new(ApprovalQueue::default());
        let sink = RecordingSink::new();
        let shared_sink = SharedSink::new();
        shared_sink.install(sink.clone());

        let activity = Arc::new(ActivityMonitor::new());
        let mind = Arc::new(AutonomousMind::new(
            router,
            GatedExecutor::new(registry, approvals, shared_sink),
            store,
            {
                let s = SharedSink::new();
                s.install(sink.clone());
                s
            },
            Arc::clone(&handle),
            Arc::clone(&activity),
            scratchpad.clone(),
            config,
        ));

        Fixture {
            mind,
            mock,
            sink,
            handle,
            activity,
            scratchpad,
            _dir: dir,
        }
    }

    fn scripted_cycle(mock: &MockLlm) {
        mock.push_completion(LlmCompletion {
            content: String::new(),
            tool_calls: vec![
                ToolCall {
                    id: "1".into(),
                    name: "update_scratchpad".into(),
                    arguments: serde_json::json!({"content": "# state\nworking"}),
                },
                ToolCall {
                    id: "2".into(),
                    name: "set_next_wakeup".into(),
                    arguments: serde_json::json!({"seconds": 120}),
                },
            ],
            finish_reason: FinishReason::Stop,
            usage: LlmUsage {
                input_tokens: 50,
                output_tokens: 20,
            },
            model: "mock-model".into(),
        });
    }

    fn events_named(sink: &RecordingSink, name: &str) -> usize {
        sink.broadcasts
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.data_str("event") == name)
            .count()
    }

    #[tokio::test(start_paused = true)]
    async fn tick_runs_cycle_and_persists_scratchpad() {
        let f = fixture(MindConfig::default());
        scripted_cycle(&f.mock);

        let cancel = CancellationToken::new();
        f.mind.tick(&cancel).await;

        assert_eq!(std::fs::read_to_string(&f.scratchpad).unwrap(), "# state\nworking");
        assert_eq!(f.handle.next_wakeup_secs(), 120);
        assert_eq!(f.handle.budget_remaining(), MindConfig::default().daily_budget - 1);
        assert_eq!(events_named(&f.sink, "mind_wakeup"), 1);
        assert_eq!(events_named(&f.sink, "mind_tool_use"), 2);
        assert_eq!(events_named(&f.sink, "mind_sleep"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn wakeup_tool_clamps_interval() {
        let f = fixture(MindConfig::default());
        f.mock.push_completion(LlmCompletion {
            content: String::new(),
            tool_calls: vec![ToolCall {
                id: "1".into(),
                name: "set_next_wakeup".into(),
                arguments: serde_json::json!({"seconds": 999999}),
            }],
            finish_reason: FinishReason::Stop,
            usage: LlmUsage::default(),
            model: "mock-model".into(),
        });

        let cancel = CancellationToken::new();
        f.mind.tick(&cancel).await;
        assert_eq!(f.handle.next_wakeup_secs(), 3600);
    }

    #[tokio::test(start_paused = true)]
    async fn user_activity_pauses_before_any_tool_use() {
        // Wakeup shorter than the idle window, so the touch below is still
        // fresh when the mind wakes.
        let f = fixture(MindConfig {
            default_wakeup_secs: 60,
            ..Default::default()
        });
        scripted_cycle(&f.mock);
        f.activity.touch();

        let cancel = CancellationToken::new();
        f.mind.tick(&cancel).await;

        let broadcasts = f.sink.broadcasts.lock().unwrap();
        let paused_at = broadcasts
            .iter()
            .position(|m| m.data_str("event") == "mind_paused")
            .expect("mind_paused fired");
        let first_tool = broadcasts
            .iter()
            .position(|m| m.data_str("event") == "mind_tool_use");
        if let Some(tool_at) = first_tool {
            assert!(paused_at < tool_at, "pause must precede tool use");
        }
        assert_eq!(
            broadcasts
                .iter()
                .filter(|m| m.data_str("event") == "mind_resumed")
                .count(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_sleeps_until_tomorrow() {
        let config = MindConfig {
            daily_budget: 1,
            ..Default::default()
        };
        let f = fixture(config);
        scripted_cycle(&f.mock);

        let cancel = CancellationToken::new();
        f.mind.tick(&cancel).await;
        assert_eq!(f.handle.budget_remaining(), 0);

        // Second tick: no cycle, a long sleep instead.
        let wakeups_before = events_named(&f.sink, "mind_wakeup");
        f.mind.tick(&cancel).await;
        assert_eq!(events_named(&f.sink, "mind_wakeup"), wakeups_before);
        assert!(f.handle.next_wakeup_secs() > 3600 || f.handle.next_wakeup_secs() >= 60);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_mind_skips_cycles() {
        let f = fixture(MindConfig::default());
        scripted_cycle(&f.mock);
        f.handle.set_enabled(false);

        let cancel = CancellationToken::new();
        f.mind.tick(&cancel).await;
        assert_eq!(events_named(&f.sink, "mind_wakeup"), 0);
        assert_eq!(f.mock.call_count(), 0);
    }
}

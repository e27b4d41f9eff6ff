//! Task-type routing with provider fallback, budget enforcement, and
//! truncation detection.
//!
//! Config maps each task type to an ordered candidate list. The router
//! tries candidates in order; a provider error (or an `error` finish
//! reason) falls through to the next candidate, recording `fallback_from`
//! on the replacement call's ProviderEvent. Budgets are enforced before
//! dispatch: a task that has spent its per-task ceiling, or a process that
//! has spent the daily ceiling, gets `BudgetExhausted` and the agent loop
//! terminates gracefully. Truncation is detected and recorded but never
//! retried; it surfaces through the runtime-state block instead.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use thiserror::Error;

use super::tracker::{detect_truncation, estimate_cost, CostTracker, ProviderEvent, ProviderTracker};
use super::{FinishReason, LlmClient, LlmCompletion, TaskType, ToolSchema};
use crate::message::Message;
use crate::store::{Store, UsageRow};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub provider: String,
    pub model: String,
}

impl Candidate {
    pub fn new(provider: &str, model: &str) -> Self {
        Self {
            provider: provider.to_string(),
            model: model.to_string(),
        }
    }
}

/// Ordered (provider, model) candidates per task type.
#[derive(Clone, Debug, Default)]
pub struct RouteTable {
    routes: HashMap<TaskType, Vec<Candidate>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_route(mut self, task: TaskType, candidates: Vec<Candidate>) -> Self {
        self.routes.insert(task, candidates);
        self
    }

    /// Same candidate list for every task type; the common single-provider
    /// setup.
    pub fn uniform(candidates: Vec<Candidate>) -> Self {
        let mut table = Self::new();
        for task in [
            TaskType::Planning,
            TaskType::Coding,
            TaskType::Analysis,
            TaskType::Summary,
        ] {
            table.routes.insert(task, candidates.clone());
        }
        table
    }

    pub fn candidates(&self, task: TaskType) -> &[Candidate] {
        self.routes.get(&task).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// USD ceilings. Per-task is keyed by the caller's task id (one chat
/// request, one mind cycle, one goal checkpoint); daily is process-wide.
#[derive(Clone, Copy, Debug)]
pub struct RouterBudget {
    pub per_task_usd: f64,
    pub daily_usd: f64,
}

impl Default for RouterBudget {
    fn default() -> Self {
        Self {
            per_task_usd: 0.50,
            daily_usd: 10.0,
        }
    }
}

#[derive(Error, Debug)]
pub enum RouterError {
    #[error("llm budget exhausted ({0})")]
    BudgetExhausted(String),

    #[error("no route configured for task type {}", .0.as_str())]
    NoRoute(TaskType),

    #[error("all providers failed, last error: {0}")]
    AllProvidersFailed(String),
}

pub struct LlmRouter {
    clients: HashMap<String, Arc<dyn LlmClient>>,
    routes: RouteTable,
    budget: RouterBudget,
    tracker: Arc<ProviderTracker>,
    costs: Arc<CostTracker>,
    store: Option<Store>,
}

impl LlmRouter {
    pub fn new(routes: RouteTable, budget: RouterBudget) -> Self {
        Self {
            clients: HashMap::new(),
            routes,
            budget,
            tracker: Arc::new(ProviderTracker::new()),
            costs: Arc::new(CostTracker::new()),
            store: None,
        }
    }

    pub fn register_client(mut self, client: Arc<dyn LlmClient>) -> Self {
        self.clients.insert(client.provider().to_string(), client);
        self
    }

    /// Attach the store so every call lands a row in `llm_usage`.
    pub fn with_store(mut self, store: Store) -> Self {
        self.store = Some(store);
        self
    }

    pub fn tracker(&self) -> Arc<ProviderTracker> {
        Arc::clone(&self.tracker)
    }

    pub fn costs(&self) -> Arc<CostTracker> {
        Arc::clone(&self.costs)
    }

    pub fn providers(&self) -> Vec<String> {
        self.clients.keys().cloned().collect()
    }

    fn check_budget(&self, task_id: &str) -> Result<(), RouterError> {
        if self.costs.spent_for_task(task_id) >= self.budget.per_task_usd {
            return Err(RouterError::BudgetExhausted(format!(
                "task {} reached ${:.2}",
                task_id, self.budget.per_task_usd
            )));
        }
        if self.costs.spent_today() >= self.budget.daily_usd {
            return Err(RouterError::BudgetExhausted(format!(
                "daily ceiling ${:.2}",
                self.budget.daily_usd
            )));
        }
        Ok(())
    }

    /// One completion for `task`, with fallback across the candidate list.
    pub async fn complete(
        &self,
        task: TaskType,
        task_id: &str,
        messages: &[Message],
        tools: &[ToolSchema],
    ) -> Result<LlmCompletion, RouterError> {
        self.check_budget(task_id)?;

        let candidates = self.routes.candidates(task);
        if candidates.is_empty() {
            return Err(RouterError::NoRoute(task));
        }

        let mut fallback_from = String::new();
        let mut last_error = String::from("no candidate had a registered client");

        for candidate in candidates {
            let Some(client) = self.clients.get(&candidate.provider) else {
                tracing::warn!(provider = %candidate.provider, "no client registered, skipping");
                continue;
            };

            let started = Instant::now();
            let result = client.complete(&candidate.model, messages, tools).await;
            let latency_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(completion) if completion.finish_reason != FinishReason::Error => {
                    let truncated = detect_truncation(
                        completion.finish_reason,
                        completion.usage.output_tokens,
                        &completion.content,
                    );
                    let cost = estimate_cost(&candidate.model, completion.usage);
                    self.costs.record(task_id, &candidate.provider, cost);
                    self.record(
                        candidate,
                        task,
                        completion.finish_reason,
                        latency_ms,
                        &fallback_from,
                        truncated,
                        completion.usage.input_tokens,
                        completion.usage.output_tokens,
                        cost,
                    )
                    .await;
                    return Ok(completion);
                }
                other => {
                    let detail = match other {
                        Err(e) => e.to_string(),
                        Ok(_) => "finish_reason=error".to_string(),
                    };
                    tracing::warn!(
                        provider = %candidate.provider,
                        model = %candidate.model,
                        "provider call failed, trying next candidate: {}",
                        crate::scrub::scrub(&detail)
                    );
                    self.record(
                        candidate,
                        task,
                        FinishReason::Error,
                        latency_ms,
                        &fallback_from,
                        false,
                        0,
                        0,
                        0.0,
                    )
                    .await;
                    last_error = detail;
                    fallback_from = candidate.provider.clone();
                }
            }
        }

        Err(RouterError::AllProvidersFailed(last_error))
    }

    #[allow(clippy::too_many_arguments)]
    async fn record(
        &self,
        candidate: &Candidate,
        task: TaskType,
        finish_reason: FinishReason,
        latency_ms: u64,
        fallback_from: &str,
        truncated: bool,
        input_tokens: u32,
        output_tokens: u32,
        cost_usd: f64,
    ) {
        self.tracker.record(ProviderEvent {
            provider: candidate.provider.clone(),
            model: candidate.model.clone(),
            task_type: task.as_str().to_string(),
            timestamp: Utc::now(),
            finish_reason,
            latency_ms,
            fallback_from: fallback_from.to_string(),
            suspected_truncated: truncated,
            input_tokens,
            output_tokens,
        });

        if let Some(store) = &self.store {
            let row = UsageRow {
                provider: candidate.provider.clone(),
                model: candidate.model.clone(),
                task_type: task.as_str().to_string(),
                input_tokens,
                output_tokens,
                cost_usd,
                finish_reason: finish_reason.as_str().to_string(),
                latency_ms,
                fallback_from: fallback_from.to_string(),
                suspected_truncated: truncated,
            };
            if let Err(e) = store.record_usage(row).await {
                tracing::warn!("llm_usage insert failed: {}", e);
            }
        }
    }
}

//! Provider transparency tracker and cost accounting.
//!
//! Detection only: nothing here prevents a call. The tracker surfaces
//! truncation, censorship, and fallback patterns through the runtime-state
//! block so the model can react, and the cost tracker enforces nothing by
//! itself; the router consults it before dispatch.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;

use super::{FinishReason, LlmUsage};

/// Terminal punctuation that indicates a complete response.
const TERMINAL_CHARS: &[char] = &['.', '!', '?', '}', ']', ')', '"', '\u{2019}', '\u{201d}', '`'];

/// Heuristic truncation / censorship detection.
///
/// `length` and `content_filter` finish reasons are always truncation. A
/// `stop` with more than 500 output tokens that ends mid-sentence is
/// flagged as suspected.
pub fn detect_truncation(finish_reason: FinishReason, output_tokens: u32, content: &str) -> bool {
    match finish_reason {
        FinishReason::Length | FinishReason::ContentFilter => true,
        FinishReason::Error => false,
        FinishReason::Stop => {
            if output_tokens <= 500 {
                return false;
            }
            match content.trim_end().chars().last() {
                Some(last) => !TERMINAL_CHARS.contains(&last),
                None => false,
            }
        }
    }
}

/// A single provider interaction record.
#[derive(Clone, Debug)]
pub struct ProviderEvent {
    pub provider: String,
    pub model: String,
    pub task_type: String,
    pub timestamp: DateTime<Utc>,
    pub finish_reason: FinishReason,
    pub latency_ms: u64,
    /// Provider this call replaced after a failure; empty for first choice.
    pub fallback_from: String,
    pub suspected_truncated: bool,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Aggregated stats for a single provider.
#[derive(Clone, Debug, Default)]
pub struct ProviderStats {
    pub total_calls: u64,
    pub failures: u64,
    pub truncations: u64,
    pub content_filters: u64,
    pub fallbacks_to: u64,
    pub total_latency_ms: u64,
}

impl ProviderStats {
    pub fn avg_latency_ms(&self) -> u64 {
        if self.total_calls == 0 {
            0
        } else {
            self.total_latency_ms / self.total_calls
        }
    }
}

/// Per-provider metrics. Single writer (the router), many readers (the
/// runtime-state snapshot); writes are short critical sections.
#[derive(Default)]
pub struct ProviderTracker {
    events: Mutex<Vec<ProviderEvent>>,
    stats: Mutex<HashMap<String, ProviderStats>>,
}

impl ProviderTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: ProviderEvent) {
        {
            let mut stats = self.stats.lock().expect("tracker lock");
            let entry = stats.entry(event.provider.clone()).or_default();
            entry.total_calls += 1;
            entry.total_latency_ms += event.latency_ms;
            if event.finish_reason == FinishReason::Error {
                entry.failures += 1;
            }
            if event.suspected_truncated {
                entry.truncations += 1;
            }
            if event.finish_reason == FinishReason::ContentFilter {
                entry.content_filters += 1;
            }
            if !event.fallback_from.is_empty() {
                entry.fallbacks_to += 1;
            }
        }
        self.events.lock().expect("tracker lock").push(event);
    }

    pub fn provider_stats(&self) -> HashMap<String, ProviderStats> {
        self.stats.lock().expect("tracker lock").clone()
    }

    pub fn recent_events(&self, limit: usize) -> Vec<ProviderEvent> {
        let events = self.events.lock().expect("tracker lock");
        let start = events.len().saturating_sub(limit);
        events[start..].to_vec()
    }
}

/// Per-model USD rates per 1K tokens `(input, output)`. Unknown models use
/// a conservative default so budget enforcement still bites.
static MODEL_RATES: Lazy<HashMap<&'static str, (f64, f64)>> = Lazy::new(|| {
    HashMap::from([
        ("gpt-4o", (0.0025, 0.01)),
        ("gpt-4o-mini", (0.00015, 0.0006)),
        ("claude-sonnet-4", (0.003, 0.015)),
        ("claude-haiku-3-5", (0.0008, 0.004)),
    ])
});

const DEFAULT_RATE: (f64, f64) = (0.003, 0.015);

pub fn estimate_cost(model: &str, usage: LlmUsage) -> f64 {
    let (input_rate, output_rate) = MODEL_RATES.get(model).copied().unwrap_or(DEFAULT_RATE);
    (usage.input_tokens as f64 / 1000.0) * input_rate
        + (usage.output_tokens as f64 / 1000.0) * output_rate
}

#[derive(Clone, Debug)]
struct CostRecord {
    task_id: String,
    cost_usd: f64,
    timestamp: DateTime<Utc>,
    provider: String,
}

/// Append-only list of per-call cost estimates with day / task / provider
/// rollups. Invariant: every total is the sum of the per-call estimates
/// that match the filter.
#[derive(Default)]
pub struct CostTracker {
    records: Mutex<Vec<CostRecord>>,
}

impl CostTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, task_id: &str, provider: &str, cost_usd: f64) {
        self.records.lock().expect("cost lock").push(CostRecord {
            task_id: task_id.to_string(),
            cost_usd,
            timestamp: Utc::now(),
            provider: provider.to_string(),
        });
    }

    pub fn total_usd(&self) -> f64 {
        self.records
            .lock()
            .expect("cost lock")
            .iter()
            .map(|r| r.cost_usd)
            .sum()
    }

    pub fn spent_for_task(&self, task_id: &str) -> f64 {
        self.records
            .lock()
            .expect("cost lock")
            .iter()
            .filter(|r| r.task_id == task_id)
            .map(|r| r.cost_usd)
            .sum()
    }

    pub fn spent_today(&self) -> f64 {
        let today = Utc::now().date_naive();
        self.records
            .lock()
            .expect("cost lock")
            .iter()
            .filter(|r| r.timestamp.date_naive() == today)
            .map(|r| r.cost_usd)
            .sum()
    }

    pub fn spent_for_provider(&self, provider: &str) -> f64 {
        self.records
            .lock()
            .expect("cost lock")
            .iter()
            .filter(|r| r.provider == provider)
            .map(|r| r.cost_usd)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(provider: &str, finish: FinishReason, fallback_from: &str, truncated: bool) -> ProviderEvent {
        ProviderEvent {
            provider: provider.to_string(),
            model: "m".to_string(),
            task_type: "planning".to_string(),
            timestamp: Utc::now(),
            finish_reason: finish,
            latency_ms: 100,
            fallback_from: fallback_from.to_string(),
            suspected_truncated: truncated,
            input_tokens: 10,
            output_tokens: 5,
        }
    }

    #[test]
    fn length_and_content_filter_always_truncated() {
        assert!(detect_truncation(FinishReason::Length, 1, "short"));
        assert!(detect_truncation(FinishReason::ContentFilter, 1, "short."));
    }

    #[test]
    fn long_stop_without_terminal_char_is_suspected() {
        assert!(detect_truncation(FinishReason::Stop, 501, "this just stops mid"));
        assert!(!detect_truncation(FinishReason::Stop, 501, "this one ends."));
        assert!(!detect_truncation(FinishReason::Stop, 100, "short and abrupt"));
    }

    #[test]
    fn stats_aggregate_per_provider() {
        let tracker = ProviderTracker::new();
        tracker.record(event("a", FinishReason::Stop, "", false));
        tracker.record(event("a", FinishReason::Error, "", false));
        tracker.record(event("b", FinishReason::Stop, "a", true));

        let stats = tracker.provider_stats();
        assert_eq!(stats["a"].total_calls, 2);
        assert_eq!(stats["a"].failures, 1);
        assert_eq!(stats["b"].fallbacks_to, 1);
        assert_eq!(stats["b"].truncations, 1);
        assert_eq!(stats["a"].avg_latency_ms(), 100);
    }

    #[test]
    fn recent_events_tail() {
        let tracker = ProviderTracker::new();
        for _ in 0..5 {
            tracker.record(event("a", FinishReason::Stop, "", false));
        }
        assert_eq!(tracker.recent_events(2).len(), 2);
        assert_eq!(tracker.recent_events(50).len(), 5);
    }

    #[test]
    fn cost_totals_are_sums() {
        let costs = CostTracker::new();
        costs.record("t1", "openai", 0.01);
        costs.record("t1", "openai", 0.02);
        costs.record("t2", "anthropic", 0.5);

        assert!((costs.total_usd() - 0.53).abs() < 1e-9);
        assert!((costs.spent_for_task("t1") - 0.03).abs() < 1e-9);
        assert!((costs.spent_today() - 0.53).abs() < 1e-9);
        assert!((costs.spent_for_provider("anthropic") - 0.5).abs() < 1e-9);
    }

    #[test]
    fn unknown_model_uses_default_rate() {
        let cost = estimate_cost(
            "mystery-model",
            LlmUsage {
                input_tokens: 1000,
                output_tokens: 1000,
            },
        );
        assert!((cost - (0.003 + 0.015)).abs() < 1e-9);
    }
}

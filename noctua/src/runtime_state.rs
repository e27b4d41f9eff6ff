//! Runtime-state block: code-enforced ground truth injected into every
//! system prompt.
//!
//! Unlike the conversation (which the model shapes), this block is rebuilt
//! from real data every turn: fingerprint and its status, tool counts per
//! permission tier at the caller's authority, authority and channel,
//! context mode, session gauges, and per-provider transparency stats.

use std::collections::HashMap;
use std::fmt::Write;

use crate::llm::ProviderStats;
use crate::tools::TierCounts;

/// Execution context the prompt reports to the model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextMode {
    UserChat,
    Mind,
    Goal,
}

impl ContextMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ContextMode::UserChat => "user_chat",
            ContextMode::Mind => "mind",
            ContextMode::Goal => "goal",
        }
    }
}

pub struct RuntimeState<'a> {
    pub fingerprint: &'a str,
    pub fingerprint_status: &'a str,
    pub tools: TierCounts,
    pub authority: &'a str,
    pub channel: &'a str,
    pub context_mode: ContextMode,
    pub active_sessions: usize,
    pub max_sessions: usize,
    pub pending_approvals: usize,
    pub provider_stats: &'a HashMap<String, ProviderStats>,
}

impl RuntimeState<'_> {
    pub fn render(&self) -> String {
        let mut out = String::from("<runtime_state>\n");

        if self.fingerprint.is_empty() {
            let _ = writeln!(out, "  <fingerprint status=\"{}\"/>", self.fingerprint_status);
        } else {
            let short = &self.fingerprint[..12.min(self.fingerprint.len())];
            let _ = writeln!(
                out,
                "  <fingerprint status=\"{}\">{}</fingerprint>",
                self.fingerprint_status, short
            );
        }

        let _ = writeln!(
            out,
            "  <tools total=\"{}\" safe=\"{}\" moderate=\"{}\" destructive=\"{}\" critical=\"{}\"/>",
            self.tools.total,
            self.tools.safe,
            self.tools.moderate,
            self.tools.destructive,
            self.tools.critical
        );
        let _ = writeln!(
            out,
            "  <authority current_user=\"{}\" channel=\"{}\"/>",
            self.authority, self.channel
        );
        let _ = writeln!(out, "  <context mode=\"{}\"/>", self.context_mode.as_str());
        let _ = writeln!(
            out,
            "  <sessions active=\"{}\" max=\"{}\" pending_approvals=\"{}\"/>",
            self.active_sessions, self.max_sessions, self.pending_approvals
        );

        if !self.provider_stats.is_empty() {
            out.push_str("  <providers>\n");
            let mut names: Vec<&String> = self.provider_stats.keys().collect();
            names.sort();
            for name in names {
                let stats = &self.provider_stats[name];
                let _ = writeln!(
                    out,
                    "    <provider name=\"{}\" calls=\"{}\" failures=\"{}\" truncations=\"{}\" avg_latency_ms=\"{}\"/>",
                    name,
                    stats.total_calls,
                    stats.failures,
                    stats.truncations,
                    stats.avg_latency_ms()
                );
            }
            out.push_str("  </providers>\n");
        }

        out.push_str("</runtime_state>");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_tool_counts_and_context() {
        let stats = HashMap::new();
        let state = RuntimeState {
            fingerprint: "abcdef0123456789deadbeef",
            fingerprint_status: "verified",
            tools: TierCounts {
                total: 4,
                safe: 2,
                moderate: 1,
                destructive: 1,
                critical: 0,
            },
            authority: "owner",
            channel: "cli",
            context_mode: ContextMode::UserChat,
            active_sessions: 1,
            max_sessions: 64,
            pending_approvals: 0,
            provider_stats: &stats,
        };
        let rendered = state.render();
        assert!(rendered.contains("<fingerprint status=\"verified\">abcdef012345</fingerprint>"));
        assert!(rendered.contains("total=\"4\" safe=\"2\" moderate=\"1\" destructive=\"1\""));
        assert!(rendered.contains("<context mode=\"user_chat\"/>"));
        assert!(!rendered.contains("<providers>"));
    }

    #[test]
    fn missing_fingerprint_is_self_closing() {
        let stats = HashMap::new();
        let state = RuntimeState {
            fingerprint: "",
            fingerprint_status: "unavailable",
            tools: TierCounts::default(),
            authority: "public",
            channel: "telegram",
            context_mode: ContextMode::Mind,
            active_sessions: 0,
            max_sessions: 64,
            pending_approvals: 2,
            provider_stats: &stats,
        };
        let rendered = state.render();
        assert!(rendered.contains("<fingerprint status=\"unavailable\"/>"));
        assert!(rendered.contains("pending_approvals=\"2\""));
    }

    #[test]
    fn provider_stats_sorted_by_name() {
        let mut stats = HashMap::new();
        stats.insert(
            "openai".to_string(),
            ProviderStats {
                total_calls: 3,
                failures: 1,
                ..Default::default()
            },
        );
        stats.insert("anthropic".to_string(), ProviderStats::default());
        let state = RuntimeState {
            fingerprint: "",
            fingerprint_status: "unavailable",
            tools: TierCounts::default(),
            authority: "owner",
            channel: "cli",
            context_mode: ContextMode::Goal,
            active_sessions: 0,
            max_sessions: 64,
            pending_approvals: 0,
            provider_stats: &stats,
        };
        let rendered = state.render();
        let anthropic = rendered.find("anthropic").unwrap();
        let openai = rendered.find("openai").unwrap();
        assert!(anthropic < openai);
        assert!(rendered.contains("calls=\"3\" failures=\"1\""));
    }
}

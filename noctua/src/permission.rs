//! Permission model: tool tiers, user authority, modes, and the evaluation
//! that maps (tool, tier, mode, authority) to a decision.
//!
//! The static safe-command list exempts plain read tools from any approval
//! regardless of mode. CRITICAL tools are refused outright for non-owner
//! authority in every mode.

use serde::{Deserialize, Serialize};

/// Risk class attached to a tool. Ordering matters: gating thresholds use
/// `>=` comparisons.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionTier {
    Safe,
    Moderate,
    Destructive,
    Critical,
}

impl PermissionTier {
    pub fn as_str(self) -> &'static str {
        match self {
            PermissionTier::Safe => "safe",
            PermissionTier::Moderate => "moderate",
            PermissionTier::Destructive => "destructive",
            PermissionTier::Critical => "critical",
        }
    }
}

/// Coarse permission class for the current user.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Authority {
    Owner,
    Trusted,
    Public,
}

impl Authority {
    pub fn as_str(self) -> &'static str {
        match self {
            Authority::Owner => "owner",
            Authority::Trusted => "trusted",
            Authority::Public => "public",
        }
    }
}

/// Global or session-scoped gating mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionMode {
    AskAlways,
    SmartAuto,
    FullAuto,
}

impl PermissionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            PermissionMode::AskAlways => "ask_always",
            PermissionMode::SmartAuto => "smart_auto",
            PermissionMode::FullAuto => "full_auto",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ask_always" => Some(PermissionMode::AskAlways),
            "smart_auto" => Some(PermissionMode::SmartAuto),
            "full_auto" => Some(PermissionMode::FullAuto),
            _ => None,
        }
    }
}

/// Outcome of permission evaluation for one tool call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    Allow,
    RequireApproval,
    Deny(String),
}

/// Obviously-safe tools exempt from any approval: plain reads with no side
/// effects beyond the mind's own bookkeeping.
const SAFE_COMMANDS: &[&str] = &[
    "file_read",
    "file_list",
    "goal_status",
    "schedule_list",
    "update_scratchpad",
    "set_next_wakeup",
];

pub fn is_safe_command(tool: &str) -> bool {
    SAFE_COMMANDS.contains(&tool)
}

/// Map (tool, tier, mode, authority) to a decision.
pub fn evaluate(
    tool: &str,
    tier: PermissionTier,
    mode: PermissionMode,
    authority: Authority,
) -> Decision {
    if is_safe_command(tool) {
        return Decision::Allow;
    }

    if tier == PermissionTier::Critical && authority != Authority::Owner {
        return Decision::Deny(format!(
            "critical tool '{}' requires owner authority",
            tool
        ));
    }

    match mode {
        PermissionMode::AskAlways => {
            if tier >= PermissionTier::Moderate {
                Decision::RequireApproval
            } else {
                Decision::Allow
            }
        }
        PermissionMode::SmartAuto => match tier {
            PermissionTier::Safe | PermissionTier::Moderate => Decision::Allow,
            PermissionTier::Destructive | PermissionTier::Critical => Decision::RequireApproval,
        },
        PermissionMode::FullAuto => match tier {
            PermissionTier::Critical => Decision::RequireApproval,
            _ => Decision::Allow,
        },
    }
}

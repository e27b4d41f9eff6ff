//! # noctua
//!
//! Core of a self-evolving, multi-channel agent runtime: the reasoning
//! loop, the tool registry and its permission/approval pipeline, the LLM
//! router with provider fallback and cost accounting, the autonomous mind,
//! the goal runner, and the supporting vault, fingerprint, and persistence
//! layers. The WebSocket broker that fans channel adapters into this core
//! lives in the `gateway` crate; the wire protocol in `wire`.
//!
//! ## Main modules
//!
//! - [`agent`]: [`AgentRunner`] (think-act-observe loop), [`GatedExecutor`]
//!   (permission-gated tool execution shared with the mind and goals).
//! - [`tools`]: [`Tool`] trait, [`SharedToolRegistry`], builtin tool set.
//! - [`permission`] / [`approval`]: tier evaluation and the pending
//!   approval queue with its 300 s timeout.
//! - [`llm`]: [`LlmClient`] trait, [`LlmRouter`], provider clients,
//!   [`ProviderTracker`] and [`CostTracker`].
//! - [`mind`]: [`AutonomousMind`] and its state machine.
//! - [`goals`]: [`GoalManager`], [`GoalRunner`], checkpoint model.
//! - [`session`]: [`SessionManager`], the sole owner of conversations.
//! - [`vault`] / [`fingerprint`] / [`store`]: secrets, identity,
//!   persistence.
//! - [`runtime`]: [`Runtime`], the boot-time assembly of all of the above.

pub mod agent;
pub mod approval;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod goals;
pub mod llm;
pub mod message;
pub mod mind;
pub mod permission;
pub mod runtime;
pub mod runtime_state;
pub mod scrub;
pub mod session;
pub mod sink;
pub mod store;
pub mod tools;
pub mod vault;

pub use agent::{AgentOptions, AgentRunner, ChatRequest, GatedExecutor};
pub use approval::{ApprovalOutcome, ApprovalQueue, ApprovalRequest};
pub use config::RuntimeConfig;
pub use error::{AgentError, StoreError, VaultError};
pub use fingerprint::FingerprintStatus;
pub use goals::{Checkpoint, CheckpointStatus, Goal, GoalManager, GoalRunner, GoalStatus};
pub use llm::{
    AnthropicClient, Candidate, CostTracker, FinishReason, LlmClient, LlmCompletion, LlmRouter,
    LlmUsage, MockLlm, OpenAiClient, ProviderEvent, ProviderStats, ProviderTracker, RouteTable,
    RouterBudget, RouterError, TaskType, ToolCall, ToolSchema,
};
pub use message::Message;
pub use mind::{ActivityMonitor, AutonomousMind, MindConfig, MindHandle, MindPhase};
pub use permission::{Authority, Decision, PermissionMode, PermissionTier};
pub use runtime::Runtime;
pub use runtime_state::{ContextMode, RuntimeState};
pub use scrub::scrub;
pub use session::{Session, SessionManager};
pub use sink::{ChannelSink, NullSink, SharedSink};
pub use store::Store;
pub use tools::{SharedToolRegistry, Tool, ToolCallContext, ToolRegistry, ToolResult};
pub use vault::{SharedVault, Vault};

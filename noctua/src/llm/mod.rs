//! LLM client abstraction and the provider router.
//!
//! The agent loop and the mind talk only to [`router::LlmRouter`]; provider
//! selection, fallback, cost accounting, and truncation detection stay
//! behind it. Implementations of [`LlmClient`]: [`OpenAiClient`] (via
//! async-openai), [`AnthropicClient`] (reqwest Messages API), and
//! [`MockLlm`] (scripted responses for tests).

mod anthropic;
mod mock;
mod openai;
pub mod router;
pub mod tracker;

pub use anthropic::AnthropicClient;
pub use mock::MockLlm;
pub use openai::OpenAiClient;
pub use router::{Candidate, LlmRouter, RouteTable, RouterBudget, RouterError};
pub use tracker::{detect_truncation, CostTracker, ProviderEvent, ProviderStats, ProviderTracker};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::message::Message;

/// Task-type tag the router maps to an ordered candidate list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Planning,
    Coding,
    Analysis,
    Summary,
}

impl TaskType {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::Planning => "planning",
            TaskType::Coding => "coding",
            TaskType::Analysis => "analysis",
            TaskType::Summary => "summary",
        }
    }
}

/// Why a completion stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    Error,
}

impl FinishReason {
    pub fn as_str(self) -> &'static str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::Length => "length",
            FinishReason::ContentFilter => "content_filter",
            FinishReason::Error => "error",
        }
    }
}

/// One tool invocation requested by the model.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// Token usage for one call.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct LlmUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Compact tool schema handed to providers (name + description + JSON
/// schema for arguments).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Provider-agnostic completion result.
#[derive(Clone, Debug)]
pub struct LlmCompletion {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: FinishReason,
    pub usage: LlmUsage,
    pub model: String,
}

/// Provider client failures. The router treats any of these as grounds for
/// falling back to the next candidate.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("transport: {0}")]
    Transport(String),

    #[error("provider rejected request: {0}")]
    Api(String),

    #[error("malformed provider response: {0}")]
    Malformed(String),
}

/// One provider client: messages plus tool schemas in, completion out.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Stable provider tag recorded on ProviderEvents ("openai",
    /// "anthropic", "mock").
    fn provider(&self) -> &str;

    async fn complete(
        &self,
        model: &str,
        messages: &[Message],
        tools: &[ToolSchema],
    ) -> Result<LlmCompletion, LlmError>;
}

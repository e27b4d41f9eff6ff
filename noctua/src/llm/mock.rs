//! Scripted LLM client for tests.

use std::sync::Mutex;

use async_trait::async_trait;

use super::{FinishReason, LlmClient, LlmCompletion, LlmError, LlmUsage, ToolSchema};
use crate::message::Message;

/// Returns scripted completions in order, repeating the last one when the
/// script runs out. An empty script echoes a fixed reply. Scripted errors
/// let router fallback tests simulate a failing provider.
pub struct MockLlm {
    provider: String,
    script: Mutex<Vec<Result<LlmCompletion, String>>>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl MockLlm {
    pub fn new() -> Self {
        Self::named("mock")
    }

    pub fn named(provider: &str) -> Self {
        Self {
            provider: provider.to_string(),
            script: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue a plain text completion.
    pub fn push_text(&self, content: &str) {
        self.script.lock().unwrap().push(Ok(LlmCompletion {
            content: content.to_string(),
            tool_calls: Vec::new(),
            finish_reason: FinishReason::Stop,
            usage: LlmUsage {
                input_tokens: 10,
                output_tokens: content.split_whitespace().count() as u32,
            },
            model: "mock-model".to_string(),
        }));
    }

    /// Queue a completion verbatim.
    pub fn push_completion(&self, completion: LlmCompletion) {
        self.script.lock().unwrap().push(Ok(completion));
    }

    /// Queue a transport error (router fallback trigger).
    pub fn push_error(&self, detail: &str) {
        self.script.lock().unwrap().push(Err(detail.to_string()));
    }

    /// Message lists the mock has seen, in call order.
    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Default for MockLlm {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    fn provider(&self) -> &str {
        &self.provider
    }

    async fn complete(
        &self,
        model: &str,
        messages: &[Message],
        _tools: &[ToolSchema],
    ) -> Result<LlmCompletion, LlmError> {
        self.calls.lock().unwrap().push(messages.to_vec());

        let mut script = self.script.lock().unwrap();
        let next = if script.len() > 1 {
            script.remove(0)
        } else if let Some(last) = script.first() {
            last.clone()
        } else {
            Ok(LlmCompletion {
                content: "mock reply".to_string(),
                tool_calls: Vec::new(),
                finish_reason: FinishReason::Stop,
                usage: LlmUsage::default(),
                model: model.to_string(),
            })
        };

        next.map_err(LlmError::Transport)
    }
}

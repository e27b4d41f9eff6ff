//! Anthropic Messages API client over reqwest.
//!
//! The system turn is lifted into the `system` field; tool observations are
//! replayed as user turns (the runtime keeps a provider-neutral history and
//! does not track tool_use ids across turns). Tool schemas map onto
//! Anthropic's `tools` array as-is.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::{FinishReason, LlmClient, LlmCompletion, LlmError, LlmUsage, ToolCall, ToolSchema};
use crate::message::Message;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    max_tokens: u32,
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    /// API key from `ANTHROPIC_API_KEY`; None when unset.
    pub fn from_env() -> Option<Self> {
        std::env::var("ANTHROPIC_API_KEY").ok().map(Self::new)
    }

    /// Custom base URL for tests and proxies.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn build_body(&self, model: &str, messages: &[Message], tools: &[ToolSchema]) -> Value {
        let mut system = String::new();
        let mut api_messages: Vec<Value> = Vec::new();

        for msg in messages {
            match msg {
                Message::System(text) => {
                    if !system.is_empty() {
                        system.push('\n');
                    }
                    system.push_str(text);
                }
                Message::User(text) => {
                    api_messages.push(json!({"role": "user", "content": text}));
                }
                Message::Assistant(text) => {
                    if !text.is_empty() {
                        api_messages.push(json!({"role": "assistant", "content": text}));
                    }
                }
                Message::Tool { name, content } => {
                    api_messages.push(json!({
                        "role": "user",
                        "content": format!("[tool {} result]\n{}", name, content),
                    }));
                }
            }
        }

        let mut body = json!({
            "model": model,
            "max_tokens": self.max_tokens,
            "messages": api_messages,
        });
        if !system.is_empty() {
            body["system"] = json!(system);
        }
        if !tools.is_empty() {
            let tool_defs: Vec<Value> = tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.input_schema,
                    })
                })
                .collect();
            body["tools"] = json!(tool_defs);
        }
        body
    }

    fn parse_response(json: Value) -> Result<LlmCompletion, LlmError> {
        let mut content = String::new();
        let mut tool_calls = Vec::new();

        let blocks = json["content"]
            .as_array()
            .ok_or_else(|| LlmError::Malformed("missing content blocks".to_string()))?;
        for block in blocks {
            match block["type"].as_str() {
                Some("text") => {
                    if let Some(text) = block["text"].as_str() {
                        if !content.is_empty() {
                            content.push('\n');
                        }
                        content.push_str(text);
                    }
                }
                Some("tool_use") => {
                    tool_calls.push(ToolCall {
                        id: block["id"].as_str().unwrap_or_default().to_string(),
                        name: block["name"].as_str().unwrap_or_default().to_string(),
                        arguments: block["input"].clone(),
                    });
                }
                _ => {}
            }
        }

        let finish_reason = match json["stop_reason"].as_str() {
            Some("max_tokens") => FinishReason::Length,
            Some("refusal") => FinishReason::ContentFilter,
            _ => FinishReason::Stop,
        };

        let usage = LlmUsage {
            input_tokens: json["usage"]["input_tokens"].as_u64().unwrap_or(0) as u32,
            output_tokens: json["usage"]["output_tokens"].as_u64().unwrap_or(0) as u32,
        };

        Ok(LlmCompletion {
            content,
            tool_calls,
            finish_reason,
            usage,
            model: json["model"].as_str().unwrap_or_default().to_string(),
        })
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    fn provider(&self) -> &str {
        "anthropic"
    }

    async fn complete(
        &self,
        model: &str,
        messages: &[Message],
        tools: &[ToolSchema],
    ) -> Result<LlmCompletion, LlmError> {
        let body = self.build_body(model, messages, tools);
        debug!(model = %model, message_count = messages.len(), "anthropic messages create");

        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|e| LlmError::Malformed(e.to_string()))?;

        if !status.is_success() {
            let detail = payload["error"]["message"]
                .as_str()
                .unwrap_or("unknown error");
            return Err(LlmError::Api(format!("{}: {}", status, detail)));
        }

        Self::parse_response(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_turn_lifted_into_system_field() {
        let client = AnthropicClient::new("key");
        let body = client.build_body(
            "claude-sonnet-4",
            &[
                Message::system("be brief"),
                Message::user("hi"),
                Message::assistant("hello"),
            ],
            &[],
        );
        assert_eq!(body["system"], "be brief");
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn tools_forwarded_with_input_schema() {
        let client = AnthropicClient::new("key");
        let body = client.build_body(
            "claude-sonnet-4",
            &[Message::user("hi")],
            &[ToolSchema {
                name: "file_read".to_string(),
                description: "read a file".to_string(),
                input_schema: json!({"type": "object"}),
            }],
        );
        assert_eq!(body["tools"][0]["name"], "file_read");
        assert_eq!(body["tools"][0]["input_schema"]["type"], "object");
    }

    #[test]
    fn parse_text_and_tool_use_blocks() {
        let completion = AnthropicClient::parse_response(json!({
            "model": "claude-sonnet-4",
            "stop_reason": "tool_use",
            "content": [
                {"type": "text", "text": "let me check"},
                {"type": "tool_use", "id": "tu_1", "name": "file_read", "input": {"path": "/tmp/x"}},
            ],
            "usage": {"input_tokens": 12, "output_tokens": 34},
        }))
        .unwrap();

        assert_eq!(completion.content, "let me check");
        assert_eq!(completion.tool_calls.len(), 1);
        assert_eq!(completion.tool_calls[0].name, "file_read");
        assert_eq!(completion.finish_reason, FinishReason::Stop);
        assert_eq!(completion.usage.output_tokens, 34);
    }

    #[test]
    fn max_tokens_maps_to_length() {
        let completion = AnthropicClient::parse_response(json!({
            "model": "m",
            "stop_reason": "max_tokens",
            "content": [{"type": "text", "text": "cut off mid"}],
            "usage": {"input_tokens": 1, "output_tokens": 2},
        }))
        .unwrap();
        assert_eq!(completion.finish_reason, FinishReason::Length);
    }

    #[tokio::test]
    async fn unreachable_base_is_transport_error() {
        let client = AnthropicClient::new("key").with_base_url("http://127.0.0.1:1");
        let result = client
            .complete("claude-sonnet-4", &[Message::user("hi")], &[])
            .await;
        assert!(matches!(result, Err(LlmError::Transport(_))));
    }
}

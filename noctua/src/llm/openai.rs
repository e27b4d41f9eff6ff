//! OpenAI Chat Completions client.
//!
//! Uses `OPENAI_API_KEY` from the environment by default (or an explicit
//! config for tests and proxies). Tool schemas are forwarded as function
//! tools; tool calls come back with JSON-string arguments which are parsed
//! leniently: unparseable arguments degrade to a `{"raw": ...}` wrapper so
//! the registry can still surface a validation error to the model.

use async_trait::async_trait;
use tracing::debug;

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionMessageToolCalls, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage, ChatCompletionTool,
        ChatCompletionTools, CreateChatCompletionRequestArgs, FinishReason as OpenAiFinishReason,
        FunctionObject,
    },
    Client,
};

use super::{FinishReason, LlmClient, LlmCompletion, LlmError, LlmUsage, ToolCall, ToolSchema};
use crate::message::Message;

pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    temperature: Option<f32>,
}

impl OpenAiClient {
    /// API key from `OPENAI_API_KEY`.
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            temperature: None,
        }
    }

    /// Custom config (key, base URL) for tests and proxies.
    pub fn with_config(config: OpenAIConfig) -> Self {
        Self {
            client: Client::with_config(config),
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    fn request_messages(messages: &[Message]) -> Vec<ChatCompletionRequestMessage> {
        messages
            .iter()
            .map(|m| match m {
                Message::System(s) => ChatCompletionRequestMessage::System(
                    ChatCompletionRequestSystemMessage::from(s.as_str()),
                ),
                Message::User(s) => ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessage::from(s.as_str()),
                ),
                Message::Assistant(s) => {
                    ChatCompletionRequestMessage::Assistant((s.as_str()).into())
                }
                // Tool observations are replayed as user turns carrying the
                // tool name; the runtime does not track OpenAI tool-call ids
                // across turns.
                Message::Tool { name, content } => ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessage::from(
                        format!("[tool {} result]\n{}", name, content).as_str(),
                    ),
                ),
            })
            .collect()
    }

    fn request_tools(tools: &[ToolSchema]) -> Vec<ChatCompletionTools> {
        tools
            .iter()
            .map(|t| {
                ChatCompletionTools::Function(ChatCompletionTool {
                    function: FunctionObject {
                        name: t.name.clone(),
                        description: Some(t.description.clone()),
                        parameters: Some(t.input_schema.clone()),
                        ..Default::default()
                    },
                })
            })
            .collect()
    }
}

impl Default for OpenAiClient {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_arguments(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::json!({ "raw": raw }))
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn provider(&self) -> &str {
        "openai"
    }

    async fn complete(
        &self,
        model: &str,
        messages: &[Message],
        tools: &[ToolSchema],
    ) -> Result<LlmCompletion, LlmError> {
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(model);
        args.messages(Self::request_messages(messages));
        if !tools.is_empty() {
            args.tools(Self::request_tools(tools));
        }
        if let Some(t) = self.temperature {
            args.temperature(t);
        }
        let request = args
            .build()
            .map_err(|e| LlmError::Malformed(format!("request build: {}", e)))?;

        debug!(
            model = %model,
            message_count = messages.len(),
            tools_count = tools.len(),
            "openai chat create"
        );

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::Malformed("no choices in response".to_string()))?;

        let finish_reason = match choice.finish_reason {
            Some(OpenAiFinishReason::Length) => FinishReason::Length,
            Some(OpenAiFinishReason::ContentFilter) => FinishReason::ContentFilter,
            _ => FinishReason::Stop,
        };

        let msg = choice.message;
        let content = msg.content.unwrap_or_default();
        let tool_calls: Vec<ToolCall> = msg
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .filter_map(|tc| match tc {
                ChatCompletionMessageToolCalls::Function(f) => Some(ToolCall {
                    id: f.id,
                    name: f.function.name,
                    arguments: parse_arguments(&f.function.arguments),
                }),
                _ => None,
            })
            .collect();

        let usage = response
            .usage
            .map(|u| LlmUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        Ok(LlmCompletion {
            content,
            tool_calls,
            finish_reason,
            usage,
            model: response.model,
        })
    }
}

//! Conversation turns. Role-tagged messages accumulated on a session and
//! replayed into every LLM prompt.

use serde::{Deserialize, Serialize};

/// One turn of a conversation.
///
/// `Tool` carries the observation appended after a tool execution; the
/// content is the serialized `ToolResult` (or a denial note when the
/// permission engine refused the call).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    System(String),
    User(String),
    Assistant(String),
    Tool { name: String, content: String },
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Message::System(content.into())
    }

    pub fn user(content: impl Into<String>) -> Self {
        Message::User(content.into())
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Message::Assistant(content.into())
    }

    pub fn tool(name: impl Into<String>, content: impl Into<String>) -> Self {
        Message::Tool {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Stable role tag used by the store and the provider clients.
    pub fn role(&self) -> &'static str {
        match self {
            Message::System(_) => "system",
            Message::User(_) => "user",
            Message::Assistant(_) => "assistant",
            Message::Tool { .. } => "tool",
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Message::System(c) | Message::User(c) | Message::Assistant(c) => c,
            Message::Tool { content, .. } => content,
        }
    }

    /// Rebuild a turn from a `(role, content)` row. Tool rows store the tool
    /// name as a `name:` prefix inside content when persisted; unknown roles
    /// degrade to user turns rather than failing a whole history load.
    pub fn from_row(role: &str, content: &str) -> Self {
        match role {
            "system" => Message::system(content),
            "assistant" => Message::assistant(content),
            "tool" => match content.split_once('\n') {
                Some((name, rest)) => Message::tool(name, rest),
                None => Message::tool("", content),
            },
            _ => Message::user(content),
        }
    }

    /// Inverse of [`Message::from_row`].
    pub fn to_row(&self) -> (&'static str, String) {
        match self {
            Message::Tool { name, content } => ("tool", format!("{}\n{}", name, content)),
            other => (other.role(), other.content().to_string()),
        }
    }
}

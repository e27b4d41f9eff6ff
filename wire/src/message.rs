//! The gateway message envelope and its typed constructors.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Frame type. Directionality is enforced by the gateway dispatcher:
/// adapters may send `Chat`, `Command`, `ApprovalResponse`; everything else
/// is gateway → adapter only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Chat,
    Command,
    ApprovalResponse,
    Response,
    ApprovalRequest,
    Event,
    Error,
    Status,
}

impl MessageType {
    /// True for the types an adapter is allowed to send inbound.
    pub fn inbound(self) -> bool {
        matches!(
            self,
            MessageType::Chat | MessageType::Command | MessageType::ApprovalResponse
        )
    }
}

/// One frame of gateway traffic.
///
/// `id` is unique per sender for the process lifetime; `session_id` is empty
/// on the first chat of a conversation and bound by the gateway's reply.
/// `data` keys vary per type; the notable ones are `content`, `reply_to`,
/// `tool_name`, `description`, `event`, `detail` and `client_id`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GatewayMessage {
    pub id: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl GatewayMessage {
    pub fn new(message_type: MessageType) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            message_type,
            session_id: String::new(),
            channel: String::new(),
            user_id: String::new(),
            data: Map::new(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// `data.reply_to`, when present. Every gateway reply carries this equal
    /// to the id of the triggering message.
    pub fn reply_to(&self) -> Option<&str> {
        self.data.get("reply_to").and_then(Value::as_str)
    }

    /// String payload field, empty when absent or not a string.
    pub fn data_str(&self, key: &str) -> &str {
        self.data.get(key).and_then(Value::as_str).unwrap_or("")
    }

    pub fn with_data(mut self, key: &str, value: Value) -> Self {
        self.data.insert(key.to_string(), value);
        self
    }
}

/// Chat message from an adapter. `session_id` empty on the first message of
/// a conversation.
pub fn chat(content: &str, channel: &str, user_id: &str, session_id: &str) -> GatewayMessage {
    let mut msg = GatewayMessage::new(MessageType::Chat);
    msg.channel = channel.to_string();
    msg.user_id = user_id.to_string();
    msg.session_id = session_id.to_string();
    msg.data
        .insert("content".to_string(), Value::String(content.to_string()));
    msg
}

/// Command message (`clear`, `status`, `cancel`, `mind …`, `health`,
/// `restart`). `args` is an optional bag of command arguments.
pub fn command(
    name: &str,
    args: Option<Value>,
    channel: &str,
    user_id: &str,
    session_id: &str,
) -> GatewayMessage {
    let mut msg = GatewayMessage::new(MessageType::Command);
    msg.channel = channel.to_string();
    msg.user_id = user_id.to_string();
    msg.session_id = session_id.to_string();
    msg.data
        .insert("command".to_string(), Value::String(name.to_string()));
    if let Some(args) = args {
        msg.data.insert("args".to_string(), args);
    }
    msg
}

/// Adapter's verdict on a pending approval, keyed by the request id the
/// gateway surfaced.
pub fn approval_response(request_id: &str, approved: bool, channel: &str) -> GatewayMessage {
    let mut msg = GatewayMessage::new(MessageType::ApprovalResponse);
    msg.channel = channel.to_string();
    msg.data.insert(
        "request_id".to_string(),
        Value::String(request_id.to_string()),
    );
    msg.data.insert("approved".to_string(), Value::Bool(approved));
    msg
}

/// Final assistant reply for a chat or command, `reply_to` set to the
/// request id.
pub fn response_to(request: &GatewayMessage, content: &str, session_id: &str) -> GatewayMessage {
    let mut msg = GatewayMessage::new(MessageType::Response);
    msg.session_id = session_id.to_string();
    msg.channel = request.channel.clone();
    msg.user_id = request.user_id.clone();
    msg.data
        .insert("reply_to".to_string(), Value::String(request.id.clone()));
    msg.data
        .insert("content".to_string(), Value::String(content.to_string()));
    msg
}

/// Error reply, `reply_to` set to the request id, detail scrubbed by the
/// gateway before it gets here.
pub fn error_to(request: &GatewayMessage, detail: &str) -> GatewayMessage {
    let mut msg = GatewayMessage::new(MessageType::Error);
    msg.session_id = request.session_id.clone();
    msg.channel = request.channel.clone();
    msg.data
        .insert("reply_to".to_string(), Value::String(request.id.clone()));
    msg.data
        .insert("detail".to_string(), Value::String(detail.to_string()));
    msg
}

/// Approval request pushed back to the originating channel. The message id
/// doubles as the approval-queue key the adapter must echo in its
/// `approval_response`.
pub fn approval_request(
    tool_name: &str,
    description: &str,
    params: Value,
    session_id: &str,
    channel: &str,
) -> GatewayMessage {
    let mut msg = GatewayMessage::new(MessageType::ApprovalRequest);
    msg.session_id = session_id.to_string();
    msg.channel = channel.to_string();
    msg.data
        .insert("tool_name".to_string(), Value::String(tool_name.to_string()));
    msg.data.insert(
        "description".to_string(),
        Value::String(description.to_string()),
    );
    msg.data.insert("params".to_string(), params);
    msg
}

/// Unsolicited event (`mind_wakeup`, `goal_completed`, `approval_timeout`, …).
pub fn event(name: &str, detail: Value, session_id: &str) -> GatewayMessage {
    let mut msg = GatewayMessage::new(MessageType::Event);
    msg.session_id = session_id.to_string();
    msg.data
        .insert("event".to_string(), Value::String(name.to_string()));
    msg.data.insert("detail".to_string(), detail);
    msg
}

/// Status frame. The first frame after connect is one of these carrying
/// `data.client_id`.
pub fn status(data: Map<String, Value>) -> GatewayMessage {
    let mut msg = GatewayMessage::new(MessageType::Status);
    msg.data = data;
    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_roundtrip() {
        let msg = chat("hi there", "telegram", "u1", "");
        let json = msg.to_json().unwrap();
        assert!(json.contains("\"type\":\"chat\""));
        assert!(json.contains("\"channel\":\"telegram\""));
        let parsed = GatewayMessage::from_json(&json).unwrap();
        assert_eq!(parsed.message_type, MessageType::Chat);
        assert_eq!(parsed.data_str("content"), "hi there");
        assert_eq!(parsed.id, msg.id);
    }

    #[test]
    fn response_carries_reply_to() {
        let req = chat("hello", "cli", "u1", "s1");
        let resp = response_to(&req, "Hello", "s1");
        assert_eq!(resp.reply_to(), Some(req.id.as_str()));
        assert_eq!(resp.session_id, "s1");
        assert_eq!(resp.channel, "cli");
    }

    #[test]
    fn error_carries_reply_to() {
        let req = command("status", None, "cli", "u1", "s1");
        let err = error_to(&req, "boom");
        assert_eq!(err.reply_to(), Some(req.id.as_str()));
        assert_eq!(err.data_str("detail"), "boom");
    }

    #[test]
    fn approval_response_fields() {
        let msg = approval_response("req-9", true, "slack");
        let json = msg.to_json().unwrap();
        assert!(json.contains("\"type\":\"approval_response\""));
        let parsed = GatewayMessage::from_json(&json).unwrap();
        assert_eq!(parsed.data_str("request_id"), "req-9");
        assert_eq!(parsed.data.get("approved"), Some(&Value::Bool(true)));
    }

    #[test]
    fn inbound_directionality() {
        assert!(MessageType::Chat.inbound());
        assert!(MessageType::Command.inbound());
        assert!(MessageType::ApprovalResponse.inbound());
        assert!(!MessageType::Response.inbound());
        assert!(!MessageType::Event.inbound());
        assert!(!MessageType::Status.inbound());
    }

    #[test]
    fn missing_fields_default() {
        let parsed =
            GatewayMessage::from_json(r#"{"id":"x","type":"chat","data":{"content":"hi"}}"#)
                .unwrap();
        assert_eq!(parsed.session_id, "");
        assert_eq!(parsed.channel, "");
        assert_eq!(parsed.data_str("content"), "hi");
    }
}

//! End-to-end gateway tests over a real WebSocket (tokio-tungstenite),
//! with the LLM scripted through `MockLlm`.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use noctua::{
    Candidate, FinishReason, LlmClient, LlmCompletion, LlmUsage, MockLlm, PermissionMode,
    RouteTable, Runtime, RuntimeConfig, ToolCall,
};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use wire::{GatewayMessage, MessageType};

struct TestGateway {
    addr: std::net::SocketAddr,
    mock: Arc<MockLlm>,
    _dir: tempfile::TempDir,
}

async fn start_gateway(configure: impl FnOnce(&mut RuntimeConfig)) -> TestGateway {
    let dir = tempfile::tempdir().unwrap();
    let mut config = RuntimeConfig::for_dir(dir.path());
    configure(&mut config);

    let mock = Arc::new(MockLlm::new());
    let runtime = Runtime::boot_with(
        config,
        vec![Arc::clone(&mock) as Arc<dyn LlmClient>],
        RouteTable::uniform(vec![Candidate::new("mock", "mock-model")]),
    )
    .await
    .unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(gateway::run_gateway_on_listener(runtime, listener, false));

    TestGateway {
        addr,
        mock,
        _dir: dir,
    }
}

async fn connect(
    addr: std::net::SocketAddr,
) -> (
    impl futures_util::Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
    impl futures_util::Stream<
            Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>,
        > + Unpin,
    GatewayMessage,
) {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/", addr))
        .await
        .unwrap();
    let (tx, mut rx) = ws.split();
    let hello = next_message(&mut rx).await;
    assert_eq!(hello.message_type, MessageType::Status);
    assert!(!hello.data_str("client_id").is_empty());
    (tx, rx, hello)
}

async fn next_message(
    rx: &mut (impl futures_util::Stream<
        Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>,
    > + Unpin),
) -> GatewayMessage {
    loop {
        let frame = tokio::time::timeout(std::time::Duration::from_secs(10), rx.next())
            .await
            .expect("frame within 10s")
            .expect("stream open")
            .expect("frame ok");
        if let WsMessage::Text(text) = frame {
            return GatewayMessage::from_json(&text).unwrap();
        }
    }
}

async fn send(
    tx: &mut (impl futures_util::Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error>
          + Unpin),
    message: &GatewayMessage,
) {
    tx.send(WsMessage::Text(message.to_json().unwrap()))
        .await
        .unwrap();
}

#[tokio::test]
async fn chat_reply_carries_reply_to_and_session() {
    let gw = start_gateway(|_| {}).await;
    gw.mock.push_text("Hello");

    let (mut tx, mut rx, _) = connect(gw.addr).await;
    let chat = wire::chat("hi", "cli", "u1", "");
    send(&mut tx, &chat).await;

    let reply = next_message(&mut rx).await;
    assert_eq!(reply.message_type, MessageType::Response);
    assert_eq!(reply.reply_to(), Some(chat.id.as_str()));
    assert_eq!(reply.data_str("content"), "Hello");
    assert!(!reply.session_id.is_empty());
}

#[tokio::test]
async fn session_history_spans_messages() {
    let gw = start_gateway(|_| {}).await;
    gw.mock.push_text("first reply");

    let (mut tx, mut rx, _) = connect(gw.addr).await;
    send(&mut tx, &wire::chat("first", "cli", "u1", "")).await;
    let reply = next_message(&mut rx).await;
    let session_id = reply.session_id.clone();

    send(&mut tx, &wire::chat("second", "cli", "u1", &session_id)).await;
    let reply2 = next_message(&mut rx).await;
    assert_eq!(reply2.session_id, session_id);

    // The second call's prompt contains the first exchange.
    let calls = gw.mock.calls();
    let last_call = calls.last().unwrap();
    let transcript: String = last_call.iter().map(|m| m.content().to_string()).collect();
    assert!(transcript.contains("first"));
    assert!(transcript.contains("first reply"));
}

#[tokio::test]
async fn denied_approval_blocks_the_tool() {
    let gw = start_gateway(|config| {
        config.permission_mode = PermissionMode::AskAlways;
    })
    .await;
    gw.mock.push_completion(LlmCompletion {
        content: String::new(),
        tool_calls: vec![ToolCall {
            id: "t1".to_string(),
            name: "file_write".to_string(),
            arguments: serde_json::json!({"path": "/tmp/gateway-test-x", "content": "data"}),
        }],
        finish_reason: FinishReason::Stop,
        usage: LlmUsage {
            input_tokens: 5,
            output_tokens: 5,
        },
        model: "mock-model".to_string(),
    });
    gw.mock.push_text("The write was blocked by the user, so I did nothing.");

    let (mut tx, mut rx, _) = connect(gw.addr).await;
    let chat = wire::chat("write a file", "cli", "u1", "");
    send(&mut tx, &chat).await;

    let approval = next_message(&mut rx).await;
    assert_eq!(approval.message_type, MessageType::ApprovalRequest);
    assert_eq!(approval.data_str("tool_name"), "file_write");

    send(&mut tx, &wire::approval_response(&approval.id, false, "cli")).await;

    let reply = next_message(&mut rx).await;
    assert_eq!(reply.message_type, MessageType::Response);
    assert_eq!(reply.reply_to(), Some(chat.id.as_str()));
    assert!(reply.data_str("content").contains("blocked"));
    assert!(!std::path::Path::new("/tmp/gateway-test-x").exists());
}

#[tokio::test]
async fn status_command_replies_with_snapshot() {
    let gw = start_gateway(|_| {}).await;
    let (mut tx, mut rx, _) = connect(gw.addr).await;

    let command = wire::command("status", None, "cli", "u1", "");
    send(&mut tx, &command).await;

    let reply = next_message(&mut rx).await;
    assert_eq!(reply.message_type, MessageType::Status);
    assert_eq!(reply.reply_to(), Some(command.id.as_str()));
    assert!(reply.data.get("tools").is_some());
    assert!(reply.data.get("mind").is_some());
}

#[tokio::test]
async fn malformed_json_is_ignored() {
    let gw = start_gateway(|_| {}).await;
    gw.mock.push_text("still alive");

    let (mut tx, mut rx, _) = connect(gw.addr).await;
    tx.send(WsMessage::Text("{not json".to_string())).await.unwrap();

    // Connection survives: a real chat still gets its reply.
    let chat = wire::chat("ping", "cli", "u1", "");
    send(&mut tx, &chat).await;
    let reply = next_message(&mut rx).await;
    assert_eq!(reply.reply_to(), Some(chat.id.as_str()));
}

#[tokio::test]
async fn unknown_command_gets_error_with_reply_to() {
    let gw = start_gateway(|_| {}).await;
    let (mut tx, mut rx, _) = connect(gw.addr).await;

    let command = wire::command("explode", None, "cli", "u1", "");
    send(&mut tx, &command).await;

    let reply = next_message(&mut rx).await;
    assert_eq!(reply.message_type, MessageType::Error);
    assert_eq!(reply.reply_to(), Some(command.id.as_str()));
}

#[tokio::test]
async fn gateway_token_gates_unauthenticated_adapters() {
    let gw = start_gateway(|config| {
        config.gateway_token = Some("sekrit".to_string());
    })
    .await;
    gw.mock.push_text("authed reply");

    // Without auth: first frame is rejected and the socket closes.
    {
        let (mut tx, mut rx, _) = connect(gw.addr).await;
        send(&mut tx, &wire::chat("hi", "cli", "u1", "")).await;
        let reply = next_message(&mut rx).await;
        assert_eq!(reply.message_type, MessageType::Error);
    }

    // With the auth command first, chats flow.
    let (mut tx, mut rx, _) = connect(gw.addr).await;
    let auth = wire::command(
        "auth",
        Some(serde_json::json!({"token": "sekrit"})),
        "cli",
        "u1",
        "",
    );
    send(&mut tx, &auth).await;
    let ack = next_message(&mut rx).await;
    assert_eq!(ack.message_type, MessageType::Status);

    let chat = wire::chat("hi", "cli", "u1", "");
    send(&mut tx, &chat).await;
    let reply = next_message(&mut rx).await;
    assert_eq!(reply.message_type, MessageType::Response);
    assert_eq!(reply.data_str("content"), "authed reply");
}

#[tokio::test]
async fn mind_command_controls_the_mind() {
    let gw = start_gateway(|_| {}).await;
    let (mut tx, mut rx, _) = connect(gw.addr).await;

    let stop = wire::command("mind stop", None, "cli", "u1", "");
    send(&mut tx, &stop).await;
    let reply = next_message(&mut rx).await;
    assert_eq!(reply.data["mind"], "stopped");

    let status = wire::command("mind", None, "cli", "u1", "");
    send(&mut tx, &status).await;
    let reply = next_message(&mut rx).await;
    assert_eq!(reply.data["mind"]["enabled"], false);

    let start = wire::command("mind start", None, "cli", "u1", "");
    send(&mut tx, &start).await;
    let reply = next_message(&mut rx).await;
    assert_eq!(reply.data["mind"], "started");
}

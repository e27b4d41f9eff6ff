//! # wire
//!
//! Gateway protocol types for noctua: every frame on the adapter/gateway
//! WebSocket is one JSON-encoded [`GatewayMessage`].
//!
//! Adapter → gateway types: `chat`, `command`, `approval_response`.
//! Gateway → adapter types: `response`, `approval_request`, `event`,
//! `error`, `status`. The first frame after connect is always a `status`
//! from the gateway carrying `data.client_id`; every gateway reply carries
//! `data.reply_to` equal to the id of the request it answers.
//!
//! Constructors ([`chat`], [`command`], [`response_to`], …) fill the
//! envelope so adapters and the broker never hand-build payload maps.

mod message;

pub use message::{
    approval_request, approval_response, chat, command, error_to, event, response_to, status,
    GatewayMessage, MessageType,
};

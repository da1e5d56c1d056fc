//! Decoded protocol frames exchanged with the [`Transport`](crate::Transport).
//!
//! The engine works entirely in terms of these decoded frames; the wire
//! encoding (text grammar, length prefixes, TLS) is the transport's concern.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Frames sent from the client to the broker.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrame {
    /// Handshake frame carrying client identity and auth credentials.
    Connect(ConnectInfo),
    /// Publish a payload to a subject, optionally requesting a reply.
    Pub {
        subject: String,
        reply_to: Option<String>,
        payload: Bytes,
    },
    /// Register a subscription under a client-chosen sid.
    Sub {
        sid: u64,
        subject: String,
        queue_group: Option<String>,
    },
    /// Remove a subscription.
    Unsub { sid: u64 },
    /// Round-trip marker; the broker answers with [`ServerFrame::Pong`]
    /// after processing everything sent before it.
    Ping,
    /// Answer to a broker [`ServerFrame::Ping`].
    Pong,
}

/// Frames received from the broker.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerFrame {
    /// Broker greeting; always the first frame on a fresh connection.
    Info(ServerInfo),
    /// Message delivery for a subscription.
    Msg {
        sid: u64,
        subject: String,
        reply_to: Option<String>,
        payload: Bytes,
    },
    /// Broker liveness probe; the engine answers with [`ClientFrame::Pong`].
    Ping,
    /// Acknowledgment of a previously sent [`ClientFrame::Ping`].
    Pong,
    /// Acknowledgment in verbose mode.
    Ok,
    /// Broker-reported protocol error.
    Err(String),
}

/// Contents of the CONNECT handshake frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectInfo {
    pub verbose: bool,
    pub pedantic: bool,
    /// `false` suppresses echo of the client's own publishes.
    pub echo: bool,
    pub lang: String,
    pub version: String,
    pub protocol: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pass: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwt: Option<String>,
}

/// Fields of the broker INFO frame. Unknown fields are ignored and missing
/// fields default, so the engine tolerates broker version skew.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerInfo {
    pub server_id: String,
    pub server_name: String,
    pub version: String,
    pub proto: i32,
    pub max_payload: usize,
    pub tls_required: bool,
    pub auth_required: bool,
}

/// A message delivered to a subscription callback or resolved from a request.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Identifier of the subscription this message was routed to.
    pub sid: u64,
    /// Subject the message was published under.
    pub subject: String,
    /// Reply subject for request/reply, if the publisher asked for one.
    pub reply_to: Option<String>,
    /// Raw payload bytes.
    pub payload: Bytes,
}

impl Message {
    /// Payload as UTF-8, lossily converted. Convenience for text payloads.
    pub fn payload_lossy(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

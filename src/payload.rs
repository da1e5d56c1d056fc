//! Payload-encoding policy applied by the facade before publish.
//!
//! Raw byte buffers always pass through unchanged. Otherwise the configured
//! [`PayloadMode`] decides how a value becomes bytes:
//!
//! - `Text`: UTF-8 encode the string (empty string for an absent value)
//! - `Json`: serialize with `serde_json` (`null` for an absent value)
//! - `Binary`: only raw buffers are accepted

use crate::error::{RelayLinkError, Result};
use bytes::Bytes;
use serde_json::Value;

/// Configured encoding discipline for outgoing message bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayloadMode {
    /// Treat values as strings (the default).
    #[default]
    Text,
    /// Serialize values as JSON.
    Json,
    /// Accept only raw byte buffers.
    Binary,
}

/// A value handed to `publish`/`request` before encoding.
#[derive(Debug, Clone)]
pub enum Payload {
    /// Raw bytes; pass through unchanged in every mode.
    Bytes(Bytes),
    /// A string value.
    Text(String),
    /// A JSON value.
    Json(Value),
    /// No value supplied.
    Empty,
}

impl Payload {
    fn kind(&self) -> &'static str {
        match self {
            Payload::Bytes(_) => "bytes",
            Payload::Text(_) => "text",
            Payload::Json(_) => "json",
            Payload::Empty => "empty",
        }
    }
}

impl From<Bytes> for Payload {
    fn from(bytes: Bytes) -> Self {
        Payload::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Bytes(Bytes::from(bytes))
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Payload::Bytes(Bytes::copy_from_slice(bytes))
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Json(value)
    }
}

/// Encode a payload value under the given mode.
pub fn encode(mode: PayloadMode, payload: Payload) -> Result<Bytes> {
    match (mode, payload) {
        (_, Payload::Bytes(bytes)) => Ok(bytes),
        (PayloadMode::Text, Payload::Text(text)) => Ok(Bytes::from(text)),
        (PayloadMode::Text, Payload::Empty) => Ok(Bytes::new()),
        (PayloadMode::Json, Payload::Json(value)) => json_bytes(&value),
        (PayloadMode::Json, Payload::Text(text)) => json_bytes(&Value::String(text)),
        (PayloadMode::Json, Payload::Empty) => Ok(Bytes::from_static(b"null")),
        (mode, other) => Err(RelayLinkError::InvalidPayloadType(format!(
            "{:?} mode cannot encode a {} payload",
            mode,
            other.kind()
        ))),
    }
}

fn json_bytes(value: &Value) -> Result<Bytes> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|e| RelayLinkError::InvalidPayloadType(e.to_string()))
}

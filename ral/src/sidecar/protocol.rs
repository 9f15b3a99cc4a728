//! Wire types for the sidecar's two transports: newline-delimited JSON
//! request/response over a Unix domain socket, and subscribe/event frames
//! over a local websocket (spec §4.4).

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcRequest {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcResponse {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IpcResponse {
    #[must_use]
    pub const fn ok(id: String, result: Value) -> Self {
        Self { id, result: Some(result), error: None }
    }

    #[must_use]
    pub const fn err(id: String, error: String) -> Self {
        Self { id, result: None, error: Some(error) }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WsClientFrame {
    Subscribe { channel: String, #[serde(default)] params: Value },
    Unsubscribe { channel: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WsServerFrame {
    #[serde(rename = "subscribed")]
    Subscribed { channel: String },
    #[serde(rename = "unsubscribed")]
    Unsubscribed { channel: String },
    #[serde(rename = "error")]
    Error { channel: String, message: String },
    #[serde(rename = "event")]
    Event { channel: String, data: Value },
}

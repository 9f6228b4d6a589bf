//! JSON-RPC 2.0 message shapes spoken by workers.

use super::CallEnvelope;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Protocol revision announced during the handshake.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Handshake request method.
pub const METHOD_INITIALIZE: &str = "initialize";

/// Liveness probe method.
pub const METHOD_PING: &str = "ping";

/// Tool invocation method.
pub const METHOD_TOOLS_CALL: &str = "tools/call";

/// Notification sent once the handshake completes.
pub const INITIALIZED_NOTIFICATION: &str = "notifications/initialized";

/// Outgoing request or notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonRpcRequest {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<u64>,
    method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

impl JsonRpcRequest {
    /// Creates a request expecting a response.
    #[must_use]
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id: Some(id),
            method: method.into(),
            params,
        }
    }

    /// Creates a notification; no response is expected.
    #[must_use]
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id: None,
            method: method.into(),
            params,
        }
    }

    /// Returns the request id, absent for notifications.
    #[must_use]
    pub const fn id(&self) -> Option<u64> {
        self.id
    }

    /// Returns the method name.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }
}

/// Error object of a failed response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code.
    pub code: i64,
    /// Error message.
    pub message: String,
}

/// Incoming response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Echoed request id; absent on server notifications.
    #[serde(default)]
    pub id: Option<u64>,
    /// Result payload on success.
    #[serde(default)]
    pub result: Option<Value>,
    /// Error payload on failure.
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

/// Builds `initialize` parameters identifying this control plane.
#[must_use]
pub fn initialize_params() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        },
    })
}

/// Builds `tools/call` parameters for an envelope.
#[must_use]
pub fn tool_call_params(envelope: &CallEnvelope) -> Value {
    json!({
        "name": envelope.tool_name(),
        "arguments": envelope.parameters(),
        "_meta": {"callId": envelope.call_id().to_string()},
    })
}

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicI64, Ordering};

/// MCP protocol version advertised by this client.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Request ids are allocated from one process-wide counter so a leaked
/// response from one server can never match another server's pending
/// table.
static REQUEST_ID: AtomicI64 = AtomicI64::new(0);

pub fn next_request_id() -> i64 {
    REQUEST_ID.fetch_add(1, Ordering::Relaxed) + 1
}

#[derive(Debug, Serialize)]
pub struct Request {
    pub jsonrpc: &'static str,
    pub id: i64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id: next_request_id(),
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Notification {
    pub jsonrpc: &'static str,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Notification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.into(),
            params,
        }
    }
}

/// Any incoming JSON-RPC message. A response carries an `id`; a
/// server-initiated notification carries a `method` but no `id`.
#[derive(Debug, Deserialize)]
pub struct IncomingMessage {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcError>,
}

impl IncomingMessage {
    pub fn is_notification(&self) -> bool {
        self.id.is_none() && self.method.is_some()
    }

    /// Convert a response message into the call outcome.
    pub fn into_outcome(self) -> Result<Value, RpcError> {
        if let Some(err) = self.error {
            Err(err)
        } else {
            Ok(self.result.unwrap_or(Value::Null))
        }
    }
}

#[derive(Debug, Clone, Deserialize, thiserror::Error)]
#[error("RPC error {code}: {message}")]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_ids_are_strictly_increasing() {
        let a = next_request_id();
        let b = next_request_id();
        let c = next_request_id();
        assert!(a < b && b < c);
    }

    #[test]
    fn test_request_serialization_shape() {
        let req = Request::new("tools/list", None);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["method"], "tools/list");
        assert!(json.get("params").is_none());
        assert!(json["id"].is_i64());
    }

    #[test]
    fn test_notification_has_no_id() {
        let n = Notification::new("notifications/initialized", None);
        let json = serde_json::to_value(&n).unwrap();
        assert!(json.get("id").is_none());
    }

    #[test]
    fn test_incoming_response_vs_notification() {
        let resp: IncomingMessage =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":7,"result":{"ok":true}}"#).unwrap();
        assert!(!resp.is_notification());
        assert_eq!(resp.into_outcome().unwrap()["ok"], true);

        let notif: IncomingMessage =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"notifications/progress"}"#)
                .unwrap();
        assert!(notif.is_notification());

        let err: IncomingMessage = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":8,"error":{"code":-32601,"message":"method not found"}}"#,
        )
        .unwrap();
        let outcome = err.into_outcome().unwrap_err();
        assert_eq!(outcome.code, -32601);
    }
}

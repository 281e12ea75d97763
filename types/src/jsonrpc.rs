//! JSON-RPC 2.0 envelope types.

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// The only protocol version accepted in the `jsonrpc` field.
pub const JSONRPC_VERSION: &str = "2.0";

/// Standard and MCP-specific JSON-RPC error codes.
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
    /// Implementation-defined server error, used for transport-level rejections.
    pub const SERVER_ERROR: i32 = -32000;
    pub const RESOURCE_NOT_FOUND: i32 = -32002;
}

/// A request identifier. MCP forbids `null` ids on requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::String(s) => write!(f, "{}", s),
        }
    }
}

/// JSON-RPC 2.0 Request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC 2.0 Notification (a request without an id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC 2.0 Response.
///
/// `id` is serialized as `null` when absent, as required for errors raised
/// before a request id could be determined.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Option<RequestId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Create a success response.
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: Option<RequestId>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// JSON-RPC 2.0 Error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Any single JSON-RPC message a client may send.
///
/// Classified by its keys: `method` with `id` is a request, `method` alone a
/// notification, `result` or `error` a response. A message that carries an
/// `id` next to `method` but fails to decode as a request is rejected rather
/// than downgraded to a notification.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
    Response(JsonRpcResponse),
}

impl<'de> Deserialize<'de> for JsonRpcMessage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let has_method = value.get("method").is_some();
        let has_id = value.get("id").is_some();
        let has_outcome = value.get("result").is_some() || value.get("error").is_some();

        let message = match (has_method, has_id) {
            (true, true) => serde_json::from_value(value).map(Self::Request),
            (true, false) => serde_json::from_value(value).map(Self::Notification),
            (false, _) if has_outcome => serde_json::from_value(value).map(Self::Response),
            (false, _) => return Err(de::Error::custom("not a JSON-RPC 2.0 message")),
        };
        message.map_err(de::Error::custom)
    }
}

impl JsonRpcMessage {
    /// The method name, if this is a request or notification.
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request(r) => Some(&r.method),
            Self::Notification(n) => Some(&n.method),
            Self::Response(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_classification() {
        let request: JsonRpcMessage =
            serde_json::from_value(json!({"jsonrpc": "2.0", "id": 1, "method": "ping"})).unwrap();
        assert!(matches!(request, JsonRpcMessage::Request(ref r) if r.id == RequestId::Number(1)));

        let notification: JsonRpcMessage = serde_json::from_value(
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        )
        .unwrap();
        assert!(matches!(notification, JsonRpcMessage::Notification(_)));

        let response: JsonRpcMessage =
            serde_json::from_value(json!({"jsonrpc": "2.0", "id": "a", "result": {}})).unwrap();
        assert!(matches!(response, JsonRpcMessage::Response(_)));
        assert_eq!(response.method(), None);
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(serde_json::from_value::<JsonRpcMessage>(json!({"hello": "world"})).is_err());
        assert!(serde_json::from_value::<JsonRpcMessage>(json!(42)).is_err());
        assert!(serde_json::from_value::<JsonRpcMessage>(json!({"jsonrpc": "2.0"})).is_err());
    }

    #[test]
    fn test_request_with_invalid_id_is_not_a_notification() {
        for id in [json!(null), json!(1.5), json!({"n": 1})] {
            let result = serde_json::from_value::<JsonRpcMessage>(
                json!({"jsonrpc": "2.0", "id": id, "method": "tools/list"}),
            );
            assert!(result.is_err(), "id {} was accepted", id);
        }
    }

    #[test]
    fn test_error_response_serializes_null_id() {
        let response = JsonRpcResponse::error(None, error_codes::SERVER_ERROR, "Bad Request");
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(
            value,
            json!({
                "jsonrpc": "2.0",
                "id": null,
                "error": {"code": -32000, "message": "Bad Request"}
            })
        );
    }
}

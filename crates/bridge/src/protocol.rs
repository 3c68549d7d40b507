//! Messages exchanged with a child tool provider, one JSON object per line,
//! and the classifier the reader task runs on every line it frames.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use tg_domain::tool::ToolDefinition;

/// Protocol revision sent in the `initialize` handshake.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

const JSONRPC: &str = "2.0";

/// One call to the child. `id` comes from the connection's pending table and
/// is what the reader uses to find the caller again.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC.into(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// Sent once after the handshake (`notifications/initialized`). Never
/// registered as pending.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC.into(),
            method: method.into(),
            params,
        }
    }
}

/// A reply line. Only numeric ids are accepted; see [`Incoming::parse`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub jsonrpc: String,
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// `error` wins when a reply carries both. A reply with neither counts
    /// as a null result.
    pub fn into_result(self) -> Result<Value, JsonRpcError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Error object reported by the child. Surfaces to callers as
/// `BridgeError::Remote`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "provider error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for JsonRpcError {}

/// What a single line read from the child turned out to be.
#[derive(Debug, PartialEq)]
pub enum Incoming {
    /// A reply carrying one of our numeric ids.
    Response(JsonRpcResponse),
    /// A server-initiated request or notification. We never answer these.
    ServerMessage { method: String },
    /// Valid JSON that is not a message we understand (string ids, batches...).
    Unrecognized,
}

impl Incoming {
    /// Classify one line. Returns `None` when the line is not JSON at all.
    pub fn parse(line: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(line).ok()?;
        let Some(obj) = value.as_object() else {
            return Some(Self::Unrecognized);
        };
        if let Some(method) = obj.get("method").and_then(Value::as_str) {
            return Some(Self::ServerMessage {
                method: method.to_owned(),
            });
        }
        let is_reply = obj.contains_key("result") || obj.contains_key("error");
        if is_reply && obj.get("id").is_some_and(Value::is_u64) {
            if let Ok(resp) = serde_json::from_value::<JsonRpcResponse>(value) {
                return Some(Self::Response(resp));
            }
        }
        Some(Self::Unrecognized)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: String,
    pub capabilities: Value,
    pub client_info: ClientInfo,
}

/// Identifies taskgate to the child in `initialize`.
pub fn initialize_params() -> InitializeParams {
    InitializeParams {
        protocol_version: PROTOCOL_VERSION.into(),
        capabilities: serde_json::json!({}),
        client_info: ClientInfo {
            name: "taskgate".into(),
            version: env!("CARGO_PKG_VERSION").into(),
        },
    }
}

/// A `tools/list` row. Missing description or schema fall back to empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteToolDef {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_schema")]
    pub input_schema: Value,
}

fn default_schema() -> Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

impl RemoteToolDef {
    pub fn into_definition(self) -> ToolDefinition {
        ToolDefinition {
            name: self.name,
            description: self.description,
            input_schema: self.input_schema,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsListResult {
    #[serde(default)]
    pub tools: Vec<RemoteToolDef>,
    /// Present when the provider paginates its catalog.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_request_without_params() {
        let req = JsonRpcRequest::new(2, "tools/list", None);
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(json, r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#);
    }

    #[test]
    fn serialize_notification() {
        let notif = JsonRpcNotification::new("notifications/initialized", None);
        let json = serde_json::to_string(&notif).unwrap();
        assert!(json.contains("\"method\":\"notifications/initialized\""));
        assert!(!json.contains("\"id\""));
    }

    #[test]
    fn classify_success_and_error_replies() {
        let ok = Incoming::parse(r#"{"jsonrpc":"2.0","id":1,"result":{"x":1}}"#).unwrap();
        let Incoming::Response(resp) = ok else {
            panic!("expected response");
        };
        assert_eq!(resp.into_result().unwrap()["x"], 1);

        let err = Incoming::parse(
            r#"{"jsonrpc":"2.0","id":4,"error":{"code":-32601,"message":"Method not found"}}"#,
        )
        .unwrap();
        let Incoming::Response(resp) = err else {
            panic!("expected response");
        };
        assert_eq!(resp.id, 4);
        assert_eq!(resp.into_result().unwrap_err().code, -32601);
    }

    #[test]
    fn classify_server_messages() {
        let notif = Incoming::parse(r#"{"jsonrpc":"2.0","method":"notifications/progress"}"#);
        assert_eq!(
            notif,
            Some(Incoming::ServerMessage {
                method: "notifications/progress".into()
            })
        );
        let req = Incoming::parse(r#"{"jsonrpc":"2.0","id":9,"method":"roots/list"}"#);
        assert!(matches!(req, Some(Incoming::ServerMessage { .. })));
    }

    #[test]
    fn classify_odd_lines() {
        assert_eq!(Incoming::parse("starting server on stdio"), None);
        assert_eq!(
            Incoming::parse(r#"{"jsonrpc":"2.0","id":"abc","result":{}}"#),
            Some(Incoming::Unrecognized)
        );
        assert_eq!(Incoming::parse("[1,2]"), Some(Incoming::Unrecognized));
        assert_eq!(
            Incoming::parse(r#"{"id":3}"#),
            Some(Incoming::Unrecognized)
        );
    }

    #[test]
    fn tools_list_defaults_and_cursor() {
        let raw = r#"{ "tools": [{ "name": "ping" }], "nextCursor": "p2" }"#;
        let result: ToolsListResult = serde_json::from_str(raw).unwrap();
        assert_eq!(result.tools[0].description, "");
        assert_eq!(result.tools[0].input_schema["type"], "object");
        assert_eq!(result.next_cursor.as_deref(), Some("p2"));
    }

    #[test]
    fn initialize_params_shape() {
        let json = serde_json::to_value(initialize_params()).unwrap();
        assert_eq!(json["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(json["clientInfo"]["name"], "taskgate");
    }
}

//! JSON-RPC 2.0 framing shared by the stdio and HTTP transports.
//!
//! Reference: <https://spec.modelcontextprotocol.io/>

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use toolgate_core::{CallToolResult, McpError, McpToolDescriptor};

pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC 2.0 request.
#[derive(Debug, Serialize)]
pub struct JsonRpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl<'a> JsonRpcRequest<'a> {
    pub const fn new(id: u64, method: &'a str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error.
#[derive(Debug, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

impl JsonRpcResponse {
    pub fn into_result(self) -> Result<Value, McpError> {
        if let Some(err) = self.error {
            return Err(McpError::Server {
                code: err.code,
                message: err.message,
            });
        }
        self.result
            .ok_or_else(|| McpError::Protocol("Missing result in response".to_string()))
    }
}

/// Notification (no id, no response).
pub fn notification(method: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": {}
    })
}

pub fn initialize_params() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "clientInfo": {
            "name": "toolgate",
            "version": env!("CARGO_PKG_VERSION")
        },
        "capabilities": {}
    })
}

/// Whether an initialize result advertises the tools capability.
pub fn supports_tools(initialize_result: &Value) -> bool {
    initialize_result
        .get("capabilities")
        .and_then(|c| c.get("tools"))
        .is_some()
}

pub fn parse_tools(result: Value) -> Result<Vec<McpToolDescriptor>, McpError> {
    let tools = result.get("tools").cloned().unwrap_or_else(|| json!([]));
    serde_json::from_value(tools).map_err(|e| McpError::Protocol(e.to_string()))
}

pub fn parse_call_result(result: Value) -> Result<CallToolResult, McpError> {
    serde_json::from_value(result).map_err(|e| McpError::Protocol(e.to_string()))
}

pub fn call_params(name: &str, arguments: Value) -> Value {
    json!({
        "name": name,
        "arguments": arguments
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_rpc_request_serialization() {
        let request = JsonRpcRequest::new(1, "tools/list", None);
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"method\":\"tools/list\""));
        assert!(!json.contains("params"));
    }

    #[test]
    fn test_json_rpc_error_becomes_server_error() {
        let json =
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32600,"message":"Invalid Request"}}"#;
        let response: JsonRpcResponse = serde_json::from_str(json).unwrap();
        let err = response.into_result().unwrap_err();
        assert!(matches!(err, McpError::Server { code: -32600, .. }));
    }

    #[test]
    fn test_parse_tools_tolerates_missing_fields() {
        let tools = parse_tools(json!({
            "tools": [
                {"name": "read_file", "inputSchema": {"type": "object"}},
                {"name": "list_dir", "description": "List"}
            ]
        }))
        .unwrap();
        assert_eq!(tools.len(), 2);
        assert!(tools[1].input_schema.is_none());
        assert!(parse_tools(json!({})).unwrap().is_empty());
    }

    #[test]
    fn test_supports_tools() {
        assert!(supports_tools(&json!({"capabilities": {"tools": {}}})));
        assert!(!supports_tools(&json!({"capabilities": {}})));
    }
}

//! Wire envelopes.
//!
//! Two layers live here:
//! - [`ToolResult`]: the uniform `{success, message|error, ...payload}` object
//!   every tool produces.
//! - JSON-RPC 2.0 request/response types used by the MCP stdio server.

use crate::core::error::SmartOpsError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const JSONRPC_VERSION: &str = "2.0";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

/// Result envelope shared by every tool.
///
/// Exactly one of `message` / `error` is set. Tool-specific fields are
/// flattened into the top level next to them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl ToolResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            error: None,
            payload: Map::new(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.into()),
            payload: Map::new(),
        }
    }

    /// Attach a payload field. Envelope keys are not overwritable.
    pub fn with(mut self, key: &str, value: impl Serialize) -> Self {
        if matches!(key, "success" | "message" | "error") {
            return self;
        }
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.payload.insert(key.to_string(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }
}

impl From<SmartOpsError> for ToolResult {
    fn from(err: SmartOpsError) -> Self {
        ToolResult::failure(err.to_string())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    /// Absent for notifications.
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl RpcRequest {
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

pub fn success_response(id: Value, result: Value) -> RpcResponse {
    RpcResponse {
        jsonrpc: JSONRPC_VERSION.to_string(),
        id,
        result: Some(result),
        error: None,
    }
}

pub fn error_response(id: Value, code: i64, message: impl Into<String>) -> RpcResponse {
    RpcResponse {
        jsonrpc: JSONRPC_VERSION.to_string(),
        id,
        result: None,
        error: Some(RpcError {
            code,
            message: message.into(),
            data: None,
        }),
    }
}

/// MCP `tools/call` result wrapping a [`ToolResult`].
pub fn tool_call_result(result: &ToolResult) -> Value {
    let text = serde_json::to_string_pretty(result).unwrap_or_default();
    serde_json::json!({
        "content": [{ "type": "text", "text": text }],
        "structuredContent": result,
        "isError": !result.success,
    })
}

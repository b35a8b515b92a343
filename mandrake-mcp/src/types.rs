//! JSON-RPC 2.0 wire types and the MCP tool catalog shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An outbound JSON-RPC request. `id` is assigned by the transport and used
/// to correlate the eventual response.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    /// Always `"2.0"`.
    pub jsonrpc: &'static str,
    /// Correlation id, monotonic per transport.
    pub id: u64,
    /// The RPC method, e.g. `"tools/call"`.
    pub method: String,
    /// Method parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Build a new request with the given id.
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.into(),
            params,
        }
    }
}

/// An outbound JSON-RPC notification (no response expected).
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    /// Always `"2.0"`.
    pub jsonrpc: &'static str,
    /// The notification method.
    pub method: String,
    /// Method parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// An inbound JSON-RPC message: either a response correlated to a request we
/// sent, or a server-initiated notification.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcInbound {
    /// A response to a previously sent request.
    Response(JsonRpcResponse),
    /// A notification with no `id`.
    Notification(JsonRpcNotification),
}

/// An inbound JSON-RPC response.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    /// The id of the request this responds to.
    pub id: u64,
    /// The success payload, if the call succeeded.
    #[serde(default)]
    pub result: Option<Value>,
    /// The error payload, if the call failed.
    #[serde(default)]
    pub error: Option<JsonRpcErrorPayload>,
}

/// The `error` object of a JSON-RPC error response.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JsonRpcErrorPayload {
    /// The JSON-RPC error code.
    pub code: i64,
    /// A short human-readable message.
    pub message: String,
    /// Optional structured detail.
    #[serde(default)]
    pub data: Option<Value>,
}

/// One entry in a server's advertised tool catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    /// The tool's name, unique within its server.
    pub name: String,
    /// Human-readable description shown to the model.
    #[serde(default)]
    pub description: Option<String>,
    /// JSON schema for the tool's input arguments.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// A tool-catalog entry tagged with the server it came from, as returned by
/// [`crate::manager::Manager::list_all_tools`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogedTool {
    /// The server this tool is hosted on.
    pub server: String,
    /// The tool itself.
    #[serde(flatten)]
    pub spec: ToolSpec,
}

/// The verbatim result of a `tools/call` invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the remote server reported this call as an error.
    #[serde(rename = "isError", default)]
    pub is_error: bool,
    /// The content payload, passed through unmodified.
    pub content: Value,
}

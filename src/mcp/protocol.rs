//! JSON-RPC 2.0 and MCP message types for the stdio front-end

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::InventoryError;

// ============================================================================
// Error codes
// ============================================================================

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

/// MCP extension: the requested resource does not exist
pub const RESOURCE_NOT_FOUND: i32 = -32002;

/// Protocol revision advertised by `initialize`
pub const PROTOCOL_VERSION: &str = "2024-11-05";

// ============================================================================
// Envelope
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcId {
    Number(i64),
    String(String),
}

impl std::fmt::Display for JsonRpcId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JsonRpcId::Number(n) => write!(f, "{}", n),
            JsonRpcId::String(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,

    /// Absent for notifications
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<JsonRpcId>,

    pub method: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: JsonRpcId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            method: method.into(),
            params,
        }
    }

    pub fn notification(method: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: None,
            method: method.into(),
            params: None,
        }
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<JsonRpcId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<JsonRpcId>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<JsonRpcId>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// No id: the request could not be read far enough to find one
    pub fn parse_error(message: &str) -> Self {
        Self::error(
            None,
            JsonRpcError::new(PARSE_ERROR, format!("Parse error: {}", message)),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("Method not found: {}", method))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR, message)
    }
}

/// Resource read failures: not-found kinds get `-32002`, bad input `-32602`
impl From<&InventoryError> for JsonRpcError {
    fn from(error: &InventoryError) -> Self {
        let code = match error {
            InventoryError::NotFound(_) => RESOURCE_NOT_FOUND,
            InventoryError::InvalidInput(_) | InventoryError::AmbiguousTarget { .. } => {
                INVALID_PARAMS
            }
            _ => INTERNAL_ERROR,
        };
        Self {
            code,
            message: error.to_string(),
            data: Some(json!({ "kind": error.kind() })),
        }
    }
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for JsonRpcError {}

// ============================================================================
// initialize
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ListChanged>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourcesCapability>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListChanged {
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourcesCapability {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<bool>,

    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    pub capabilities: ServerCapabilities,
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
}

// ============================================================================
// Resources
// ============================================================================

/// Concrete entry of `resources/list`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceInfo {
    pub uri: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

/// Parameterized entry of `resources/templates/list`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceTemplateInfo {
    #[serde(rename = "uriTemplate")]
    pub uri_template: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReadResourceParams {
    pub uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceContents {
    pub uri: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadResourceResult {
    pub contents: Vec<ResourceContents>,
}

// ============================================================================
// Tools
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentItem {
    #[serde(rename = "text")]
    Text { text: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub content: Vec<ContentItem>,
    #[serde(rename = "isError", default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl ToolCallResult {
    /// Successful call; `body` is rendered as pretty JSON text
    pub fn json(body: &Value) -> Self {
        Self {
            content: vec![ContentItem::Text {
                text: pretty(body),
            }],
            is_error: None,
        }
    }

    /// Failed call, reported in-band so the client sees the message
    pub fn failure(error: &InventoryError) -> Self {
        let body = json!({
            "success": false,
            "error": error.to_string(),
            "kind": error.kind(),
        });
        Self {
            content: vec![ContentItem::Text {
                text: pretty(&body),
            }],
            is_error: Some(true),
        }
    }

    /// Concatenated text content
    pub fn text(&self) -> String {
        self.content
            .iter()
            .map(|ContentItem::Text { text }| text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request() {
        let req: JsonRpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":"r-7","method":"resources/read"}"#).unwrap();
        assert_eq!(req.method, "resources/read");
        assert_eq!(req.id, Some(JsonRpcId::String("r-7".to_string())));
        assert!(!req.is_notification());

        let note: JsonRpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#).unwrap();
        assert!(note.is_notification());
    }

    #[test]
    fn test_error_mapping_carries_kind() {
        let err = JsonRpcError::from(&InventoryError::NotFound("Item not found: X".to_string()));
        assert_eq!(err.code, RESOURCE_NOT_FOUND);
        assert_eq!(err.data, Some(json!({"kind": "not_found"})));

        let err = JsonRpcError::from(&InventoryError::Timeout);
        assert_eq!(err.code, INTERNAL_ERROR);
    }

    #[test]
    fn test_tool_failure_is_flagged() {
        let result = ToolCallResult::failure(&InventoryError::invalid("Quantity must be a non-negative integer"));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["isError"], true);

        let body: Value = serde_json::from_str(&result.text()).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["kind"], "invalid_input");
    }

    #[test]
    fn test_resource_contents_field_names() {
        let result = ReadResourceResult {
            contents: vec![ResourceContents {
                uri: "inventory://all".to_string(),
                mime_type: "application/json".to_string(),
                text: "[]".to_string(),
            }],
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["contents"][0]["mimeType"], "application/json");
    }
}

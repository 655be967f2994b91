//! Capability records and invocation results exchanged with sandbox code.
//!
//! Everything here crosses the JSON boundary into the isolate, so the wire
//! names are camelCase and optional fields are omitted rather than null.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Connection state of a backend server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    /// Handshake complete, accepting calls.
    Connected,
    /// Not currently reachable.
    Disconnected,
    /// A reconnect attempt is in progress.
    Reconnecting,
    /// The connection failed and is not being retried.
    Error,
}

impl std::fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ServerStatus::Connected => "connected",
            ServerStatus::Disconnected => "disconnected",
            ServerStatus::Reconnecting => "reconnecting",
            ServerStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Which capability kinds a backend advertises.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerCapabilities {
    /// Advertises tools.
    pub tools: bool,
    /// Advertises resources and resource templates.
    pub resources: bool,
    /// Advertises prompts.
    pub prompts: bool,
}

/// Snapshot entry for one registered server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Server name as registered with the gateway.
    pub name: String,
    /// Current connection status.
    pub status: ServerStatus,
    /// Advertised capability kinds.
    pub capabilities: ServerCapabilities,
}

/// A tool advertised by a backend, tagged with its server of origin.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInfo {
    /// Server of origin.
    pub server: String,
    /// Tool name.
    pub name: String,
    /// Tool description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: Value,
}

/// A concrete resource advertised by a backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceInfo {
    /// Server of origin.
    pub server: String,
    /// Resource URI.
    pub uri: String,
    /// Resource name.
    pub name: String,
    /// Resource description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// MIME type, when the backend declares one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// A parameterized resource template advertised by a backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTemplateInfo {
    /// Server of origin.
    pub server: String,
    /// RFC 6570 URI template.
    pub uri_template: String,
    /// Template name.
    pub name: String,
    /// Template description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// MIME type of resources produced from this template.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// One declared argument of a prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptArgument {
    /// Argument name.
    pub name: String,
    /// Argument description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether the argument must be supplied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
}

/// A prompt advertised by a backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptInfo {
    /// Server of origin.
    pub server: String,
    /// Prompt name.
    pub name: String,
    /// Prompt description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Declared arguments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Vec<PromptArgument>>,
}

/// One content item of a tool result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    /// Content kind: "text", "image", "audio", "resource".
    #[serde(rename = "type")]
    pub kind: String,
    /// Text payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Base64 payload for binary kinds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// MIME type for binary kinds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl ContentItem {
    /// A plain text content item.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".into(),
            text: Some(text.into()),
            data: None,
            mime_type: None,
        }
    }
}

/// Result of a tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    /// Ordered content items produced by the tool.
    pub content: Vec<ContentItem>,
    /// Whether the backend flagged this result as an error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

/// One content entry of a read resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContentsItem {
    /// URI of the resolved resource.
    pub uri: String,
    /// MIME type, when declared.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Text payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Base64 payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob: Option<String>,
}

/// Result of reading a resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceContent {
    /// Content entries (a URI may resolve to several).
    pub contents: Vec<ResourceContentsItem>,
}

/// One message of a rendered prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptMessage {
    /// Message role: "user" or "assistant".
    pub role: String,
    /// Message content.
    pub content: Value,
}

/// Result of rendering a prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptResult {
    /// Prompt description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Rendered messages.
    pub messages: Vec<PromptMessage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_status_serializes_lowercase() {
        let json = serde_json::to_string(&ServerStatus::Reconnecting).unwrap();
        assert_eq!(json, "\"reconnecting\"");
    }

    #[test]
    fn tool_info_wire_shape() {
        let info = ToolInfo {
            server: "github".into(),
            name: "issues.list".into(),
            description: None,
            input_schema: serde_json::json!({"type": "object"}),
        };
        let v = serde_json::to_value(&info).unwrap();
        assert_eq!(v["server"], "github");
        assert!(v.get("description").is_none(), "omit absent description");
        assert!(v.get("inputSchema").is_some(), "camelCase schema key");
    }

    #[test]
    fn tool_result_wire_shape() {
        let result = ToolResult {
            content: vec![ContentItem::text("hello")],
            is_error: Some(false),
        };
        let v = serde_json::to_value(&result).unwrap();
        assert_eq!(v["content"][0]["type"], "text");
        assert_eq!(v["content"][0]["text"], "hello");
        assert_eq!(v["isError"], false);
    }

    #[test]
    fn resource_template_uses_uri_template_key() {
        let t = ResourceTemplateInfo {
            server: "files".into(),
            uri_template: "file:///logs/{name}".into(),
            name: "log".into(),
            description: None,
            mime_type: Some("text/plain".into()),
        };
        let v = serde_json::to_value(&t).unwrap();
        assert_eq!(v["uriTemplate"], "file:///logs/{name}");
        assert_eq!(v["mimeType"], "text/plain");
    }
}

//! Tool catalog and tool result types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Arguments passed to a tool: always a JSON object.
pub type ToolArguments = serde_json::Map<String, Value>;

/// One discovered tool, qualified by the server that owns it.
///
/// Tool names are only unique per server; `(server_name, name)` is the key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    /// Tool name as advertised by the server.
    pub name: String,

    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// JSON Schema for the arguments object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,

    /// Name of the owning server.
    pub server_name: String,
}

impl ToolDescriptor {
    /// Create a tool definition owned by `server_name`.
    pub fn new(server_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema: None,
            server_name: server_name.into(),
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Set the input schema.
    #[must_use]
    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = Some(schema);
        self
    }

    /// `server.tool`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.server_name, self.name)
    }
}

/// Normalized result of a successful tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    /// Server that produced the result.
    pub server: String,

    /// Tool that produced the result.
    pub tool: String,

    /// Arguments actually sent, after any fallback transform.
    #[serde(default)]
    pub arguments: ToolArguments,

    /// Content items as returned by the server (`{"type": "text", ...}` etc).
    #[serde(default)]
    pub content: Vec<Value>,

    /// Structured content, when the server returned any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured: Option<Value>,

    /// Wall-clock time of the successful call.
    pub duration_ms: u64,

    /// The tool originally requested, when a fallback produced this result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_from: Option<String>,
}

impl ToolResult {
    /// Join all text content items with newlines.
    ///
    /// Falls back to the serialized structured content when there is no text.
    pub fn text(&self) -> String {
        let texts: Vec<&str> = self
            .content
            .iter()
            .filter(|item| item.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|item| item.get("text").and_then(Value::as_str))
            .collect();

        if texts.is_empty() {
            if let Some(structured) = &self.structured {
                return structured.to_string();
            }
        }
        texts.join("\n")
    }

    /// Whether this result came from a fallback alternative.
    pub const fn is_fallback(&self) -> bool {
        self.fallback_from.is_some()
    }
}

//! Presentation-safe failure descriptions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Broad class of a failure, for deciding how to present it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Server process lifecycle: missing, crashed, restart failed.
    Process,
    /// The server spoke the wire protocol incorrectly or not at all.
    Protocol,
    /// The tool ran and reported an error.
    Tool,
    /// No tool, or more than one, matched the request.
    Routing,
    /// Invalid configuration.
    Configuration,
}

impl ErrorCategory {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Process => "process",
            Self::Protocol => "protocol",
            Self::Tool => "tool",
            Self::Routing => "routing",
            Self::Configuration => "configuration",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured description of a failed operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInfo {
    pub category: ErrorCategory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            server: None,
            tool: None,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn with_server(mut self, server: impl Into<String>) -> Self {
        self.server = Some(server.into());
        self
    }

    #[must_use]
    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = Some(tool.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_info_serialization() {
        let info = ErrorInfo::new(ErrorCategory::Tool, "name is required")
            .with_server("beauty")
            .with_tool("create_profile");
        let value = serde_json::to_value(&info).unwrap();

        assert_eq!(value["category"], "tool");
        assert_eq!(value["server"], "beauty");
        assert_eq!(value["message"], "name is required");
    }
}

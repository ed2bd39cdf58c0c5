//! Interaction history types and the persisted context document.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::tool::ToolArguments;

const fn default_success() -> bool {
    true
}

/// One completed interaction. Entries are append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationEntry {
    pub timestamp: DateTime<Utc>,
    pub user_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_used: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_used: Option<String>,
    #[serde(default)]
    pub arguments: ToolArguments,
    #[serde(default)]
    pub tool_output: String,
    #[serde(default)]
    pub final_text: String,
    /// False when the tool call failed; `tool_output` then holds the error.
    #[serde(default = "default_success")]
    pub success: bool,
}

impl ConversationEntry {
    /// Start an entry for `user_text`, stamped now.
    pub fn new(user_text: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            user_text: user_text.into(),
            tool_used: None,
            server_used: None,
            arguments: ToolArguments::new(),
            tool_output: String::new(),
            final_text: String::new(),
            success: true,
        }
    }

    /// Record which tool handled the interaction and with what arguments.
    #[must_use]
    pub fn with_tool(
        mut self,
        server: impl Into<String>,
        tool: impl Into<String>,
        arguments: ToolArguments,
    ) -> Self {
        self.server_used = Some(server.into());
        self.tool_used = Some(tool.into());
        self.arguments = arguments;
        self
    }

    /// Set the raw tool output.
    #[must_use]
    pub fn with_tool_output(mut self, output: impl Into<String>) -> Self {
        self.tool_output = output.into();
        self
    }

    /// Mark the tool call as failed with `error` as its output.
    #[must_use]
    pub fn with_failure(mut self, error: impl Into<String>) -> Self {
        self.tool_output = error.into();
        self.success = false;
        self
    }

    /// Set the text shown to the user.
    #[must_use]
    pub fn with_final_text(mut self, text: impl Into<String>) -> Self {
        self.final_text = text.into();
        self
    }

    /// Override the timestamp.
    #[must_use]
    pub const fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Metadata about the persisted conversation session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    #[serde(default)]
    pub total_interactions: u64,
}

impl SessionInfo {
    fn starting_at(now: DateTime<Utc>) -> Self {
        Self {
            created_at: now,
            last_active_at: now,
            total_interactions: 0,
        }
    }
}

impl Default for SessionInfo {
    fn default() -> Self {
        Self::starting_at(Utc::now())
    }
}

/// Everything the context store persists, in its on-disk shape.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextDocument {
    #[serde(default)]
    pub history: Vec<ConversationEntry>,
    #[serde(default)]
    pub last_arguments_by_tool: BTreeMap<String, ToolArguments>,
    /// Servers that reached `Ready` in the most recent run.
    #[serde(default)]
    pub servers: Vec<String>,
    #[serde(default)]
    pub session: SessionInfo,
}

impl ContextDocument {
    /// Apply one interaction to the document.
    ///
    /// Last arguments are only remembered for successful entries that name
    /// a tool and carry a non-empty arguments object.
    pub fn apply(&mut self, entry: ConversationEntry) {
        if let Some(tool) = &entry.tool_used {
            if entry.success && !entry.arguments.is_empty() {
                self.last_arguments_by_tool
                    .insert(tool.clone(), entry.arguments.clone());
            }
        }
        self.session.last_active_at = entry.timestamp.max(self.session.last_active_at);
        self.session.total_interactions += 1;
        self.history.push(entry);
    }

    /// The last `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> &[ConversationEntry] {
        let start = self.history.len().saturating_sub(n);
        &self.history[start..]
    }
}

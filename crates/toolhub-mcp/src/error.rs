//! Error types for sessions, supervision, routing and dispatch.

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use toolhub_core::{ErrorCategory, ErrorInfo};

/// Failure of one request on a protocol session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Timed out after {}ms waiting for '{method}'", .timeout.as_millis())]
    Timeout { method: String, timeout: Duration },

    #[error("Server closed the connection")]
    Closed,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("Server returned error {code}: {message}")]
    Remote {
        code: i64,
        message: String,
        data: Option<Value>,
    },
}

impl SessionError {
    /// The server answered with an error; the connection itself is fine.
    pub const fn is_remote(&self) -> bool {
        matches!(self, Self::Remote { .. })
    }

    /// The stream can no longer be trusted.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Closed | Self::Protocol(_))
    }

    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Timeout { .. } | Self::Closed | Self::Transport(_) => ErrorCategory::Process,
            Self::Protocol(_) => ErrorCategory::Protocol,
            Self::Remote { .. } => ErrorCategory::Tool,
        }
    }
}

/// Failure to bring a server to `Ready`.
#[derive(Debug, Clone, Error)]
pub enum StartError {
    /// The command, entry point or working directory does not exist.
    /// Nothing was spawned.
    #[error("Launch target missing for '{server}': {reason}")]
    LaunchTargetMissing { server: String, reason: String },

    /// The OS refused to spawn an existing target.
    #[error("Failed to spawn '{server}': {reason}")]
    Spawn { server: String, reason: String },

    /// The process started but did not complete the handshake.
    #[error("Handshake with '{server}' failed: {reason}")]
    HandshakeFailed { server: String, reason: String },
}

impl StartError {
    pub fn server(&self) -> &str {
        match self {
            Self::LaunchTargetMissing { server, .. }
            | Self::Spawn { server, .. }
            | Self::HandshakeFailed { server, .. } => server,
        }
    }

    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::LaunchTargetMissing { .. } => ErrorCategory::Configuration,
            Self::Spawn { .. } => ErrorCategory::Process,
            Self::HandshakeFailed { .. } => ErrorCategory::Protocol,
        }
    }

    pub fn info(&self) -> ErrorInfo {
        ErrorInfo::new(self.category(), self.to_string()).with_server(self.server())
    }
}

/// Catalog lookup failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("{}", not_found_message(.tool, .server.as_deref()))]
    NotFound {
        tool: String,
        server: Option<String>,
    },

    #[error("Tool '{tool}' is offered by several servers: {}", .candidates.join(", "))]
    Ambiguous {
        tool: String,
        candidates: Vec<String>,
    },
}

fn not_found_message(tool: &str, server: Option<&str>) -> String {
    match server {
        Some(server) => format!("Tool '{tool}' not found on server '{server}'"),
        None => format!("Tool '{tool}' not found"),
    }
}

/// Failure of one `invoke`.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    #[error("{}", not_found_message(.tool, .server.as_deref()))]
    NotFound {
        tool: String,
        server: Option<String>,
    },

    #[error("Tool '{tool}' is offered by several servers: {}", .candidates.join(", "))]
    Ambiguous {
        tool: String,
        candidates: Vec<String>,
    },

    /// The tool ran and reported an error; `message` is the server's text.
    #[error("Tool '{tool}' on '{server}' failed: {message}")]
    ToolExecution {
        server: String,
        tool: String,
        message: String,
        code: Option<i64>,
    },

    #[error("Server '{server}' unavailable for '{tool}': {reason}")]
    ServerUnavailable {
        server: String,
        tool: String,
        reason: String,
    },
}

impl DispatchError {
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } | Self::Ambiguous { .. } => ErrorCategory::Routing,
            Self::ToolExecution { .. } => ErrorCategory::Tool,
            Self::ServerUnavailable { .. } => ErrorCategory::Process,
        }
    }

    pub fn server(&self) -> Option<&str> {
        match self {
            Self::NotFound { server, .. } => server.as_deref(),
            Self::Ambiguous { .. } => None,
            Self::ToolExecution { server, .. } | Self::ServerUnavailable { server, .. } => {
                Some(server)
            }
        }
    }

    pub fn tool(&self) -> &str {
        match self {
            Self::NotFound { tool, .. }
            | Self::Ambiguous { tool, .. }
            | Self::ToolExecution { tool, .. }
            | Self::ServerUnavailable { tool, .. } => tool,
        }
    }

    /// Presentation-safe summary.
    pub fn info(&self) -> ErrorInfo {
        let message = match self {
            Self::ToolExecution { message, .. } => message.clone(),
            other => other.to_string(),
        };
        let info = ErrorInfo::new(self.category(), message).with_tool(self.tool());
        match self.server() {
            Some(server) => info.with_server(server),
            None => info,
        }
    }
}

impl From<ResolveError> for DispatchError {
    fn from(error: ResolveError) -> Self {
        match error {
            ResolveError::NotFound { tool, server } => Self::NotFound { tool, server },
            ResolveError::Ambiguous { tool, candidates } => Self::Ambiguous { tool, candidates },
        }
    }
}

/// Orchestrator startup failure.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Every configured server failed to start.
    #[error("No tool server reached ready state ({} failed)", .failures.len())]
    NoServersReady { failures: Vec<StartError> },
}

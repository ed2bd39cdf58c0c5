//! CLI-specific error types and exit codes.

use thiserror::Error;
use toolhub_core::{ConfigError, ErrorInfo, PathError};
use toolhub_mcp::OrchestratorError;

/// CLI-specific error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// Argument parsing error.
    #[error("Invalid arguments: {0}")]
    Arguments(String),

    /// Configuration could not be found, read or validated.
    #[error("Configuration error: {0}")]
    Config(String),

    /// No server could be started.
    #[error("{0}")]
    Startup(String),

    /// A tool call failed.
    #[error("{} error: {}", .0.category, .0.message)]
    Dispatch(ErrorInfo),
}

impl CliError {
    /// Map error to appropriate exit code.
    ///
    /// Exit codes follow Unix conventions:
    /// - 1: General error
    /// - 2: Misuse of shell command (invalid arguments)
    /// - 64-78: Reserved for specific error categories (see sysexits.h)
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Dispatch(_) => 1,
            Self::Arguments(_) => 2, // EX_USAGE
            Self::Startup(_) => 69,  // EX_UNAVAILABLE
            Self::Config(_) => 78,   // EX_CONFIG
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<PathError> for CliError {
    fn from(err: PathError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<OrchestratorError> for CliError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::NoServersReady { failures } => {
                let details: Vec<String> = failures.iter().map(ToString::to_string).collect();
                Self::Startup(format!(
                    "No tool server reached ready state:\n  {}",
                    details.join("\n  ")
                ))
            }
        }
    }
}

#![doc = include_str!(concat!(env!("OUT_DIR"), "/README_GENERATED.md"))]
#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

pub mod catalog;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod launch;
pub mod orchestrator;
pub mod pool;
pub mod process;
pub mod protocol;
pub mod session;
pub mod supervisor;

#[cfg(test)]
pub(crate) mod testing;

// Used by the integration tests only
#[cfg(test)]
use toolhub_store as _;

// Re-export domain types from core for convenience
pub use toolhub_core::{
    ConnectionState, ServerDescriptor, ServerStatus, ToolArguments, ToolDescriptor, ToolResult,
};

// Re-export this crate's public types
pub use catalog::CatalogRegistry;
pub use connection::ServerConnection;
pub use dispatcher::{ArgumentTransform, Dispatcher, Fallback, FallbackChain, StatsSnapshot};
pub use error::{DispatchError, OrchestratorError, ResolveError, SessionError, StartError};
pub use orchestrator::Orchestrator;
pub use pool::{ConnectionPool, RestartOutcome};
pub use session::McpSession;
pub use supervisor::Supervisor;

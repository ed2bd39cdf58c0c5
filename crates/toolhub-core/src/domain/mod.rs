//! Domain types for toolhub.
//!
//! Pure data: no I/O, no process handling.

mod conversation;
mod failure;
mod server;
mod tool;

pub use conversation::{ContextDocument, ConversationEntry, SessionInfo};
pub use failure::{ErrorCategory, ErrorInfo};
pub use server::{ConnectionState, ServerDescriptor, ServerStatus};
pub use tool::{ToolArguments, ToolDescriptor, ToolResult};

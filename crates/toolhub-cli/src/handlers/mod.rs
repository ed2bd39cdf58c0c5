//! Command handlers.
//!
//! Handlers follow the canonical pattern:
//! - Signature: `pub async fn execute(ctx: &CliContext, ...) -> Result<()>`
//! - Thin wrappers that:
//!   1. Parse/validate CLI-specific input
//!   2. Call `Orchestrator` methods
//!   3. Format output for the terminal

pub mod call;
pub mod history;
pub mod paths;
pub mod servers;
pub mod tools;

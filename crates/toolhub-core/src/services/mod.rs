//! Application services built on the ports.

mod context_store;

pub use context_store::ContextStore;

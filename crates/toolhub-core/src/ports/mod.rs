//! Port definitions (trait abstractions) implemented by adapter crates.

pub mod context_repository;

pub use context_repository::{ContextRepository, ContextStoreError};

#[cfg(test)]
pub use context_repository::MockContextRepository;

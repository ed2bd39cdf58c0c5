//! Context persistence port.
//!
//! The context store keeps its document in memory and hands the whole
//! document to the repository after every mutation.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::ContextDocument;

/// Errors raised while loading or flushing the context document.
#[derive(Debug, Error)]
pub enum ContextStoreError {
    #[error("Context I/O error on {path}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("Failed to serialize context: {0}")]
    Serialize(String),

    /// The stored document could not be parsed. `quarantined_to` is where
    /// the unreadable file was moved, if moving it succeeded.
    #[error("Context file {path} is corrupt: {reason}")]
    Corrupt {
        path: PathBuf,
        reason: String,
        quarantined_to: Option<PathBuf>,
    },
}

/// Port for loading and saving the context document.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContextRepository: Send + Sync {
    /// Load the stored document; `Ok(None)` when nothing has been stored yet.
    async fn load(&self) -> Result<Option<ContextDocument>, ContextStoreError>;

    /// Replace the stored document. Must be atomic with respect to crashes.
    async fn save(&self, document: &ContextDocument) -> Result<(), ContextStoreError>;
}

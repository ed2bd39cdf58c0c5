//! Errors raised while locating toolhub's config and data files.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathError {
    /// `~` was used but the platform reports no home directory.
    #[error("Cannot expand '~': no home directory")]
    NoHomeDir,

    #[error("No local data directory on this platform (set TOOLHUB_DATA_DIR)")]
    NoDataDir,

    #[error("No config directory on this platform (use --config or TOOLHUB_CONFIG)")]
    NoConfigDir,

    /// The data root could not be created.
    #[error("Cannot create {path}: {reason}")]
    CreateFailed { path: PathBuf, reason: String },

    #[error("Path cannot be empty")]
    EmptyPath,

    /// A relative path could not be anchored to the working directory.
    #[error("Cannot resolve relative path: {0}")]
    CurrentDirError(String),
}

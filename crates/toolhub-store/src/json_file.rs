//! JSON file implementation of the `ContextRepository` port.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use toolhub_core::{ContextDocument, ContextRepository, ContextStoreError};

/// Stores the context document as a single JSON file.
///
/// Not safe for several processes writing the same file; the context store
/// serializes writers within one process.
#[derive(Debug, Clone)]
pub struct JsonFileContextRepository {
    path: PathBuf,
}

impl JsonFileContextRepository {
    /// Create a repository for `path`. Nothing is touched until first use.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the context file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(path: &Path, e: &std::io::Error) -> ContextStoreError {
        ContextStoreError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }
    }

    /// Move an unreadable file aside so the next save starts clean.
    async fn quarantine(&self) -> Option<PathBuf> {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(format!(".corrupt-{}", Utc::now().format("%Y%m%dT%H%M%S%.3fZ")));
        let target = self.path.with_file_name(name);

        match fs::rename(&self.path, &target).await {
            Ok(()) => Some(target),
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to quarantine corrupt context file"
                );
                None
            }
        }
    }
}

#[async_trait]
impl ContextRepository for JsonFileContextRepository {
    async fn load(&self) -> Result<Option<ContextDocument>, ContextStoreError> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No context file yet");
                return Ok(None);
            }
            Err(e) => return Err(Self::io_error(&self.path, &e)),
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        match serde_json::from_slice::<ContextDocument>(&bytes) {
            Ok(document) => Ok(Some(document)),
            Err(e) => {
                let quarantined_to = self.quarantine().await;
                Err(ContextStoreError::Corrupt {
                    path: self.path.clone(),
                    reason: e.to_string(),
                    quarantined_to,
                })
            }
        }
    }

    async fn save(&self, document: &ContextDocument) -> Result<(), ContextStoreError> {
        let json = serde_json::to_vec_pretty(document)
            .map_err(|e| ContextStoreError::Serialize(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| Self::io_error(parent, &e))?;
            }
        }

        let temp = self.temp_path();
        let mut file = fs::File::create(&temp)
            .await
            .map_err(|e| Self::io_error(&temp, &e))?;
        file.write_all(&json)
            .await
            .map_err(|e| Self::io_error(&temp, &e))?;
        file.sync_all()
            .await
            .map_err(|e| Self::io_error(&temp, &e))?;
        drop(file);

        fs::rename(&temp, &self.path)
            .await
            .map_err(|e| Self::io_error(&self.path, &e))?;

        debug!(
            path = %self.path.display(),
            entries = document.history.len(),
            "Flushed context"
        );
        Ok(())
    }
}

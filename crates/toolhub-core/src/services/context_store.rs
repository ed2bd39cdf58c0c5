//! Context store: interaction history and last-used tool arguments.
//!
//! The document is loaded once and flushed through the `ContextRepository`
//! port after every mutation. One async mutex covers the whole
//! read-modify-write-flush cycle, so concurrent writers never lose updates.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::{ContextDocument, ConversationEntry, SessionInfo, ToolArguments};
use crate::ports::{ContextRepository, ContextStoreError};

/// Durable conversation context shared by the caller-facing layer.
pub struct ContextStore {
    repo: Arc<dyn ContextRepository>,
    document: Mutex<ContextDocument>,
}

impl ContextStore {
    /// Load the stored document, starting empty when there is none.
    ///
    /// Load failures (including a corrupt file) are logged and yield an
    /// empty store; they never prevent startup.
    pub async fn open(repo: Arc<dyn ContextRepository>) -> Self {
        let document = match repo.load().await {
            Ok(Some(document)) => {
                debug!(entries = document.history.len(), "Loaded context");
                document
            }
            Ok(None) => ContextDocument::default(),
            Err(ContextStoreError::Corrupt {
                path,
                reason,
                quarantined_to,
            }) => {
                warn!(
                    path = %path.display(),
                    quarantined_to = ?quarantined_to,
                    reason = %reason,
                    "Context file is corrupt, starting with empty context"
                );
                ContextDocument::default()
            }
            Err(e) => {
                warn!(error = %e, "Failed to load context, starting with empty context");
                ContextDocument::default()
            }
        };

        Self {
            repo,
            document: Mutex::new(document),
        }
    }

    /// Append an interaction and flush.
    ///
    /// The entry stays in memory even if the flush fails; the next
    /// successful flush persists it.
    pub async fn record(&self, entry: ConversationEntry) -> Result<(), ContextStoreError> {
        let mut document = self.document.lock().await;
        document.apply(entry);
        self.repo.save(&document).await
    }

    /// Remember which servers reached `Ready` in this run, and flush.
    pub async fn note_servers(&self, names: Vec<String>) -> Result<(), ContextStoreError> {
        let mut document = self.document.lock().await;
        document.servers = names;
        document.session.last_active_at = Utc::now();
        self.repo.save(&document).await
    }

    /// Arguments last used with `tool`, if any were recorded.
    pub async fn last_arguments_for(&self, tool: &str) -> Option<ToolArguments> {
        self.document
            .lock()
            .await
            .last_arguments_by_tool
            .get(tool)
            .cloned()
    }

    /// The last `n` entries, oldest first.
    pub async fn recent(&self, n: usize) -> Vec<ConversationEntry> {
        self.document.lock().await.recent(n).to_vec()
    }

    /// Session metadata.
    pub async fn session(&self) -> SessionInfo {
        self.document.lock().await.session.clone()
    }

    /// Servers noted by the most recent `note_servers` call.
    pub async fn servers(&self) -> Vec<String> {
        self.document.lock().await.servers.clone()
    }

    /// Number of history entries.
    pub async fn len(&self) -> usize {
        self.document.lock().await.history.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

//! Caller-facing facade over the pool, catalog, dispatcher and context store.

use std::sync::Arc;

use tracing::{info, warn};

use toolhub_core::{
    ContextStore, ConversationEntry, OrchestratorSettings, ServerDescriptor, ServerStatus,
    ToolArguments, ToolDescriptor, ToolResult, ToolhubConfig,
};

use crate::catalog::CatalogRegistry;
use crate::dispatcher::{Dispatcher, FallbackChain, StatsSnapshot};
use crate::error::{DispatchError, OrchestratorError, StartError};
use crate::pool::ConnectionPool;
use crate::supervisor::Supervisor;

/// A running set of tool servers.
pub struct Orchestrator {
    pool: Arc<ConnectionPool>,
    catalog: Arc<CatalogRegistry>,
    dispatcher: Dispatcher,
    context: Arc<ContextStore>,
    startup_failures: Vec<StartError>,
}

impl Orchestrator {
    /// Start the enabled servers of `config`.
    pub async fn from_config(
        config: &ToolhubConfig,
        context: Arc<ContextStore>,
    ) -> Result<Self, OrchestratorError> {
        Self::start(config.settings.clone(), config.enabled_servers(), context).await
    }

    /// Start `servers`, discover their tools and note the ready ones in the
    /// context store.
    ///
    /// Fails only when no server reaches `Ready`. Disabled descriptors are
    /// skipped.
    pub async fn start(
        settings: OrchestratorSettings,
        servers: Vec<ServerDescriptor>,
        context: Arc<ContextStore>,
    ) -> Result<Self, OrchestratorError> {
        let servers: Vec<_> = servers.into_iter().filter(|s| s.enabled).collect();
        let discovery_timeout = settings.discovery_timeout();

        let (pool, startup_failures) = ConnectionPool::start(Supervisor::new(settings), servers).await;
        for failure in &startup_failures {
            warn!(server_name = %failure.server(), error = %failure, "Tool server failed to start");
        }

        let ready = pool.ready_names();
        if ready.is_empty() {
            return Err(OrchestratorError::NoServersReady {
                failures: startup_failures,
            });
        }

        let pool = Arc::new(pool);
        let catalog = Arc::new(CatalogRegistry::new(pool.names()));
        catalog.refresh(&pool.connections(), discovery_timeout).await;

        if let Err(e) = context.note_servers(ready.clone()).await {
            warn!(error = %e, "Failed to persist ready servers");
        }

        info!(
            ready = ready.len(),
            failed = startup_failures.len(),
            tools = catalog.snapshot().len(),
            "Orchestrator started"
        );

        let dispatcher = Dispatcher::new(Arc::clone(&pool), Arc::clone(&catalog));
        Ok(Self {
            pool,
            catalog,
            dispatcher,
            context,
            startup_failures,
        })
    }

    /// Every discovered tool, in server order.
    pub fn list_available_tools(&self) -> Vec<ToolDescriptor> {
        self.catalog.snapshot()
    }

    /// Tools grouped by server.
    pub fn tools_by_server(&self) -> Vec<(String, Vec<ToolDescriptor>)> {
        self.catalog.grouped()
    }

    pub async fn invoke(
        &self,
        tool: &str,
        arguments: &ToolArguments,
        explicit_server: Option<&str>,
        fallbacks: Option<&FallbackChain>,
    ) -> Result<ToolResult, DispatchError> {
        self.dispatcher
            .invoke(tool, arguments, explicit_server, fallbacks)
            .await
    }

    pub async fn last_arguments_for(&self, tool: &str) -> Option<ToolArguments> {
        self.context.last_arguments_for(tool).await
    }

    /// Append an interaction to the context. Persistence failures are logged
    /// and otherwise ignored.
    pub async fn record_interaction(&self, entry: ConversationEntry) {
        if let Err(e) = self.context.record(entry).await {
            warn!(error = %e, "Failed to persist interaction");
        }
    }

    pub async fn recent_history(&self, n: usize) -> Vec<ConversationEntry> {
        self.context.recent(n).await
    }

    pub fn server_statuses(&self) -> Vec<ServerStatus> {
        self.pool.statuses()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.dispatcher.stats()
    }

    /// Servers that failed to start.
    pub fn startup_failures(&self) -> &[StartError] {
        &self.startup_failures
    }

    pub fn context(&self) -> &ContextStore {
        &self.context
    }

    /// Stop every server.
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
        info!("Orchestrator stopped");
    }
}

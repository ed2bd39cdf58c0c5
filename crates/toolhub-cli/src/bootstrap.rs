//! CLI bootstrap - the composition root.
//!
//! This module is the ONLY place where infrastructure is wired together
//! for the CLI:
//! - Server configuration (via toolhub-core)
//! - JSON context file (via toolhub-store)
//! - Orchestrator with its servers (via toolhub-mcp)

use std::path::{Path, PathBuf};
use std::sync::Arc;

use toolhub_core::{
    ContextStore, ToolhubConfig, context_file_path, normalize_user_path, servers_config_path,
};
use toolhub_mcp::Orchestrator;
use toolhub_store::JsonFileContextRepository;

use crate::error::CliError;

/// Resolved file locations for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliConfig {
    /// Server configuration file.
    pub config_path: PathBuf,
    /// Context file.
    pub context_path: PathBuf,
}

impl CliConfig {
    /// Apply command-line overrides over the default locations.
    pub fn resolve(config: Option<&Path>, context: Option<&Path>) -> Result<Self, CliError> {
        let config_path = match config {
            Some(path) => normalize_user_path(&path.to_string_lossy())?,
            None => servers_config_path()?,
        };
        let context_path = match context {
            Some(path) => normalize_user_path(&path.to_string_lossy())?,
            None => context_file_path()?,
        };
        Ok(Self {
            config_path,
            context_path,
        })
    }
}

/// Fully composed application context for commands that need servers.
pub struct CliContext {
    /// The running orchestrator.
    pub orchestrator: Orchestrator,
    /// Where the server configuration came from.
    pub config_path: PathBuf,
}

/// Open the context store backed by the JSON file at `path`.
pub async fn open_context(path: &Path) -> Arc<ContextStore> {
    Arc::new(ContextStore::open(Arc::new(JsonFileContextRepository::new(path))).await)
}

/// Load the configuration and start the orchestrator.
///
/// # Errors
///
/// Fails when the configuration cannot be loaded or no server reaches
/// ready state.
pub async fn bootstrap(config: &CliConfig) -> Result<CliContext, CliError> {
    if !config.config_path.exists() {
        return Err(CliError::Config(format!(
            "No server configuration at {} (use --config or {})",
            config.config_path.display(),
            toolhub_core::CONFIG_PATH_ENV
        )));
    }

    let toolhub = ToolhubConfig::load(&config.config_path)?;
    tracing::debug!(
        path = %config.config_path.display(),
        servers = toolhub.servers.len(),
        "Loaded server configuration"
    );

    let context = open_context(&config.context_path).await;
    let orchestrator = Orchestrator::from_config(&toolhub, context).await?;

    Ok(CliContext {
        orchestrator,
        config_path: config.config_path.clone(),
    })
}

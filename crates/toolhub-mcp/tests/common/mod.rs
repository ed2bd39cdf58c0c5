//! Shared helpers for integration tests that drive `toolhub-demo-server`.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tempfile::TempDir;
use toolhub_core::{ContextStore, OrchestratorSettings, ServerDescriptor, ToolArguments};
use toolhub_mcp::{ConnectionState, Orchestrator, OrchestratorError};
use toolhub_store::JsonFileContextRepository;

/// Path of the demo server built alongside these tests.
pub fn demo_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_toolhub-demo-server"))
}

/// Descriptor for a demo server that reports `name`.
pub fn demo(name: &str) -> ServerDescriptor {
    ServerDescriptor::new(name, demo_bin().to_string_lossy())
        .with_env("TOOLHUB_DEMO_NAME", name)
        .with_description(format!("demo server {name}"))
}

/// Settings with short timeouts.
pub fn fast_settings() -> OrchestratorSettings {
    let mut settings = OrchestratorSettings::with_defaults();
    settings.handshake_timeout_ms = Some(5_000);
    settings.call_timeout_ms = Some(5_000);
    settings.discovery_timeout_ms = Some(5_000);
    settings.shutdown_grace_ms = Some(500);
    settings
}

pub fn args(value: Value) -> ToolArguments {
    value.as_object().cloned().unwrap_or_default()
}

/// An orchestrator with its context file in a temp dir.
pub struct Harness {
    pub orchestrator: Orchestrator,
    pub context_path: PathBuf,
    _dir: TempDir,
}

impl Harness {
    pub async fn start(servers: Vec<ServerDescriptor>) -> Result<Self, OrchestratorError> {
        Self::start_with(fast_settings(), servers).await
    }

    pub async fn start_with(
        settings: OrchestratorSettings,
        servers: Vec<ServerDescriptor>,
    ) -> Result<Self, OrchestratorError> {
        let dir = tempfile::tempdir().expect("temp dir");
        let context_path = dir.path().join("context.json");
        let context = Arc::new(
            ContextStore::open(Arc::new(JsonFileContextRepository::new(&context_path))).await,
        );
        let orchestrator = Orchestrator::start(settings, servers, context).await?;
        Ok(Self {
            orchestrator,
            context_path,
            _dir: dir,
        })
    }

    pub fn state_of(&self, server: &str) -> ConnectionState {
        self.orchestrator
            .server_statuses()
            .into_iter()
            .find(|status| status.name == server)
            .map(|status| status.state)
            .expect("configured server")
    }

    /// Poll until `server` reaches `state`.
    pub async fn wait_for_state(&self, server: &str, state: ConnectionState) {
        for _ in 0..100 {
            if self.state_of(server) == state {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("{server} never reached {state}");
    }
}

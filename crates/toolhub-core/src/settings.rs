//! Orchestrator settings and validation.
//!
//! All fields are optional so a config file only needs to name what it
//! changes; the `effective_*` accessors apply the defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default time allowed for the `initialize` exchange.
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 30_000;

/// Default time allowed for one tool call.
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 30_000;

/// Default time allowed for tool discovery on one server.
pub const DEFAULT_DISCOVERY_TIMEOUT_MS: u64 = 10_000;

/// Default grace period between SIGTERM and SIGKILL.
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 5_000;

/// Default number of servers started at once.
pub const DEFAULT_STARTUP_CONCURRENCY: usize = 4;

/// Default `clientInfo.name` sent during the handshake.
pub const DEFAULT_CLIENT_NAME: &str = "toolhub";

/// Orchestrator settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct OrchestratorSettings {
    pub handshake_timeout_ms: Option<u64>,
    pub call_timeout_ms: Option<u64>,
    pub discovery_timeout_ms: Option<u64>,
    pub shutdown_grace_ms: Option<u64>,
    /// Maximum number of servers spawned and handshaken concurrently.
    pub startup_concurrency: Option<usize>,
    /// Name reported to servers in `clientInfo`.
    pub client_name: Option<String>,
}

impl OrchestratorSettings {
    /// Settings with every field filled in.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            handshake_timeout_ms: Some(DEFAULT_HANDSHAKE_TIMEOUT_MS),
            call_timeout_ms: Some(DEFAULT_CALL_TIMEOUT_MS),
            discovery_timeout_ms: Some(DEFAULT_DISCOVERY_TIMEOUT_MS),
            shutdown_grace_ms: Some(DEFAULT_SHUTDOWN_GRACE_MS),
            startup_concurrency: Some(DEFAULT_STARTUP_CONCURRENCY),
            client_name: Some(DEFAULT_CLIENT_NAME.to_string()),
        }
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(
            self.handshake_timeout_ms
                .unwrap_or(DEFAULT_HANDSHAKE_TIMEOUT_MS),
        )
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms.unwrap_or(DEFAULT_CALL_TIMEOUT_MS))
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(
            self.discovery_timeout_ms
                .unwrap_or(DEFAULT_DISCOVERY_TIMEOUT_MS),
        )
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms.unwrap_or(DEFAULT_SHUTDOWN_GRACE_MS))
    }

    pub fn startup_concurrency(&self) -> usize {
        self.startup_concurrency
            .unwrap_or(DEFAULT_STARTUP_CONCURRENCY)
    }

    pub fn client_name(&self) -> &str {
        self.client_name.as_deref().unwrap_or(DEFAULT_CLIENT_NAME)
    }
}

/// Settings validation error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("{field} must be between 1 ms and 1 hour, got {value}")]
    InvalidTimeout { field: &'static str, value: u64 },

    #[error("Startup concurrency must be between 1 and 64, got {0}")]
    InvalidConcurrency(usize),

    #[error("Client name cannot be empty")]
    EmptyClientName,
}

const MAX_TIMEOUT_MS: u64 = 3_600_000;

/// Validate settings values.
pub fn validate_settings(settings: &OrchestratorSettings) -> Result<(), SettingsError> {
    let timeouts = [
        ("handshakeTimeoutMs", settings.handshake_timeout_ms),
        ("callTimeoutMs", settings.call_timeout_ms),
        ("discoveryTimeoutMs", settings.discovery_timeout_ms),
        ("shutdownGraceMs", settings.shutdown_grace_ms),
    ];
    for (field, value) in timeouts {
        if let Some(value) = value {
            if !(1..=MAX_TIMEOUT_MS).contains(&value) {
                return Err(SettingsError::InvalidTimeout { field, value });
            }
        }
    }

    if let Some(limit) = settings.startup_concurrency {
        if !(1..=64).contains(&limit) {
            return Err(SettingsError::InvalidConcurrency(limit));
        }
    }

    if settings
        .client_name
        .as_ref()
        .is_some_and(|name| name.trim().is_empty())
    {
        return Err(SettingsError::EmptyClientName);
    }

    Ok(())
}

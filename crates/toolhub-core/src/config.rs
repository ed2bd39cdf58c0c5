//! Server configuration file loading.
//!
//! The file is a JSON object with optional `settings` and a `servers` list:
//!
//! ```json
//! {
//!   "settings": { "callTimeoutMs": 30000 },
//!   "servers": [
//!     { "name": "beauty", "command": "python3", "args": ["servers/beauty.py"] }
//!   ]
//! }
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::ServerDescriptor;
use crate::settings::{OrchestratorSettings, SettingsError, validate_settings};

/// Errors raised while loading the server configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid server entry: {0}")]
    InvalidServer(String),

    #[error("Server name '{0}' is configured more than once")]
    DuplicateServer(String),

    #[error(transparent)]
    InvalidSettings(#[from] SettingsError),
}

/// Parsed and validated configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolhubConfig {
    #[serde(default)]
    pub settings: OrchestratorSettings,
    #[serde(default)]
    pub servers: Vec<ServerDescriptor>,
}

impl ToolhubConfig {
    /// Read and validate a config file.
    ///
    /// Relative working directories are resolved against the file's directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::parse(&raw, base_dir).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    /// Parse and validate config text as if it lived in `base_dir`.
    pub fn parse(raw: &str, base_dir: &Path) -> Result<Self, ConfigError> {
        let mut config: Self = serde_json::from_str(raw).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;

        for server in &mut config.servers {
            if let Some(dir) = &server.working_directory {
                if dir.is_relative() {
                    server.working_directory = Some(base_dir.join(dir));
                }
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Check settings, each descriptor, and name uniqueness.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_settings(&self.settings)?;

        let mut seen = HashSet::new();
        for server in &self.servers {
            server.validate().map_err(ConfigError::InvalidServer)?;
            if !seen.insert(server.name.as_str()) {
                return Err(ConfigError::DuplicateServer(server.name.clone()));
            }
        }
        Ok(())
    }

    /// Descriptors with `enabled: true`, in file order.
    pub fn enabled_servers(&self) -> Vec<ServerDescriptor> {
        self.servers.iter().filter(|s| s.enabled).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn test_parse_full_config() {
        let raw = r#"{
            "settings": {"callTimeoutMs": 2000},
            "servers": [
                {"name": "beauty", "command": "python3", "args": ["beauty.py"],
                 "env": {"LOG": "1"}, "workingDirectory": "servers", "description": "Palettes"},
                {"name": "sleep", "command": "node", "args": ["sleep.js"], "enabled": false}
            ]
        }"#;
        let config = ToolhubConfig::parse(raw, Path::new("/etc/toolhub")).unwrap();

        assert_eq!(config.settings.call_timeout(), Duration::from_secs(2));
        assert_eq!(config.servers.len(), 2);
        assert_eq!(
            config.servers[0].working_directory,
            Some(PathBuf::from("/etc/toolhub/servers"))
        );
        assert_eq!(config.servers[0].env["LOG"], "1");

        let enabled = config.enabled_servers();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].name, "beauty");
    }

    #[test]
    fn test_absolute_working_directory_untouched() {
        let raw = r#"{"servers": [{"name": "a", "command": "x", "workingDirectory": "/srv/a"}]}"#;
        let config = ToolhubConfig::parse(raw, Path::new("/etc/toolhub")).unwrap();
        assert_eq!(
            config.servers[0].working_directory,
            Some(PathBuf::from("/srv/a"))
        );
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let raw = r#"{"servers": [
            {"name": "a", "command": "x"},
            {"name": "a", "command": "y"}
        ]}"#;
        let err = ToolhubConfig::parse(raw, Path::new(".")).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateServer(name) if name == "a"));
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let raw = r#"{"settings": {"startupConcurrency": 0}, "servers": []}"#;
        let err = ToolhubConfig::parse(raw, Path::new(".")).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidSettings(SettingsError::InvalidConcurrency(0))
        ));
    }

    #[test]
    fn test_load_reports_path_on_bad_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{ not json").unwrap();

        let err = ToolhubConfig::load(file.path()).unwrap_err();
        match err {
            ConfigError::Parse { path, .. } => assert_eq!(path, file.path()),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_load_missing_file() {
        let err = ToolhubConfig::load(Path::new("/nonexistent/toolhub/servers.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}

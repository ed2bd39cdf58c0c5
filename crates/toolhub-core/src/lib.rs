#![doc = include_str!(concat!(env!("OUT_DIR"), "/README_GENERATED.md"))]
#![deny(unused_crate_dependencies)]

pub mod config;
pub mod domain;
pub mod paths;
pub mod ports;
pub mod services;
pub mod settings;

pub use config::{ConfigError, ToolhubConfig};
pub use domain::{
    ConnectionState, ContextDocument, ConversationEntry, ErrorCategory, ErrorInfo, ServerDescriptor,
    ServerStatus, SessionInfo, ToolArguments, ToolDescriptor, ToolResult,
};
pub use paths::{
    CONFIG_PATH_ENV, CONTEXT_FILE_NAME, DATA_DIR_ENV, PathError, config_root, context_file_path,
    data_root, normalize_user_path, servers_config_path,
};
pub use ports::{ContextRepository, ContextStoreError};
pub use services::ContextStore;
pub use settings::{
    DEFAULT_CALL_TIMEOUT_MS, DEFAULT_CLIENT_NAME, DEFAULT_DISCOVERY_TIMEOUT_MS,
    DEFAULT_HANDSHAKE_TIMEOUT_MS, DEFAULT_SHUTDOWN_GRACE_MS, DEFAULT_STARTUP_CONCURRENCY,
    OrchestratorSettings, SettingsError, validate_settings,
};

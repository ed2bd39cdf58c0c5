//! Canonical file locations: the server config and the context file.

use std::env;
use std::path::PathBuf;

use super::error::PathError;
use super::platform::{config_root, data_root, normalize_user_path};

/// Environment variable overriding the server config path.
pub const CONFIG_PATH_ENV: &str = "TOOLHUB_CONFIG";

/// File name of the persisted context inside the data root.
pub const CONTEXT_FILE_NAME: &str = "context.json";

/// Path to `servers.json`.
///
/// `TOOLHUB_CONFIG` wins over `<config dir>/toolhub/servers.json`.
pub fn servers_config_path() -> Result<PathBuf, PathError> {
    if let Ok(path) = env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return normalize_user_path(&path);
        }
    }
    Ok(config_root()?.join("servers.json"))
}

/// Path to the context file inside the data root (which is created).
pub fn context_file_path() -> Result<PathBuf, PathError> {
    Ok(data_root()?.join(CONTEXT_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::DATA_DIR_ENV;
    use crate::paths::test_utils::{ENV_LOCK, EnvVarGuard};

    #[test]
    fn test_context_file_lives_in_data_root() {
        let _lock = ENV_LOCK.lock().unwrap();
        let temp = tempfile::tempdir().unwrap();
        let _env = EnvVarGuard::set(DATA_DIR_ENV, temp.path().to_str().unwrap());

        assert_eq!(
            context_file_path().unwrap(),
            temp.path().join(CONTEXT_FILE_NAME)
        );
    }

    #[test]
    fn test_config_env_override() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _env = EnvVarGuard::set(CONFIG_PATH_ENV, "/opt/toolhub/custom.json");

        assert_eq!(
            servers_config_path().unwrap(),
            PathBuf::from("/opt/toolhub/custom.json")
        );
    }

    #[test]
    fn test_config_default_file_name() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _env = EnvVarGuard::unset(CONFIG_PATH_ENV);

        if let Ok(path) = servers_config_path() {
            assert!(path.ends_with("toolhub/servers.json"));
        }
    }
}

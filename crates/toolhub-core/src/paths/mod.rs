//! Path resolution for toolhub data and configuration.
//!
//! - Server config: `TOOLHUB_CONFIG` or `<config dir>/toolhub/servers.json`
//! - Context file: `<data root>/context.json`, data root from
//!   `TOOLHUB_DATA_DIR` or `<local data dir>/toolhub`
//!
//! Everything returns `PathBuf`/`PathError`; nothing here prompts or prints.

mod error;
mod locations;
mod platform;

#[cfg(test)]
mod test_utils;

pub use error::PathError;
pub use locations::{CONFIG_PATH_ENV, CONTEXT_FILE_NAME, context_file_path, servers_config_path};
pub use platform::{DATA_DIR_ENV, config_root, data_root, normalize_user_path};

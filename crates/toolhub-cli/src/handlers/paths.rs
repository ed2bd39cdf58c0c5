//! Paths command handler.
//!
//! Displays all resolved paths for diagnostics.

use anyhow::Result;

use toolhub_core::{CONFIG_PATH_ENV, DATA_DIR_ENV, data_root};

use crate::bootstrap::CliConfig;

/// Print every path toolhub uses in `key = value` format.
pub fn execute(config: &CliConfig) -> Result<()> {
    println!("config_file = {}", config.config_path.display());
    println!("config_exists = {}", config.config_path.exists());
    println!("data_root = {}", data_root()?.display());
    println!("context_file = {}", config.context_path.display());
    println!("context_exists = {}", config.context_path.exists());
    println!("# overrides: {CONFIG_PATH_ENV}, {DATA_DIR_ENV}, --config, --context");
    Ok(())
}

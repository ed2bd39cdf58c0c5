//! Main CLI parser and top-level argument handling.

use std::path::PathBuf;

use clap::Parser;

use crate::commands::Commands;

/// Command-line interface for the toolhub orchestrator.
#[derive(Debug, Parser)]
#[command(name = "toolhub")]
#[command(about = "Run and call local tool servers")]
#[command(version)]
pub struct Cli {
    /// Server configuration file
    #[arg(long, global = true, env = toolhub_core::CONFIG_PATH_ENV)]
    pub config: Option<PathBuf>,

    /// Context file holding history and remembered arguments
    #[arg(long, global = true)]
    pub context: Option<PathBuf>,

    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

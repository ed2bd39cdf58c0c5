//! Subcommand definitions.

use clap::Subcommand;

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start every configured server and show its state
    Servers,

    /// List the tools discovered on ready servers
    Tools {
        /// Only show tools of this server
        #[arg(long)]
        server: Option<String>,
    },

    /// Invoke a tool
    Call {
        /// Tool name, optionally qualified as `server.tool`
        tool: String,

        /// Server that owns the tool
        #[arg(long)]
        server: Option<String>,

        /// Arguments as a JSON object; defaults to the last arguments used
        #[arg(long)]
        args: Option<String>,

        /// Alternative tried when the call fails: `TOOL` or `TOOL=JSON`
        #[arg(long = "fallback", value_name = "TOOL[=JSON]")]
        fallbacks: Vec<String>,

        /// Text recorded as the user's request in the history
        #[arg(long)]
        user_text: Option<String>,
    },

    /// Show recent interactions
    History {
        /// Number of entries to show
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Show resolved configuration and data paths
    Paths,
}

#[cfg(test)]
mod tests {
    use crate::parser::Cli;
    use clap::Parser;

    use super::*;

    #[test]
    fn test_call_collects_fallbacks() {
        let cli = Cli::parse_from([
            "toolhub",
            "call",
            "create_profile",
            "--args",
            r#"{"undertone":"warm"}"#,
            "--fallback",
            r#"quick_palette={"count":3}"#,
            "--fallback",
            "echo",
        ]);
        let Some(Commands::Call {
            tool,
            args,
            fallbacks,
            server,
            ..
        }) = cli.command
        else {
            panic!("expected call");
        };
        assert_eq!(tool, "create_profile");
        assert_eq!(args.as_deref(), Some(r#"{"undertone":"warm"}"#));
        assert_eq!(fallbacks.len(), 2);
        assert!(server.is_none());
    }

    #[test]
    fn test_history_default_limit() {
        let cli = Cli::parse_from(["toolhub", "history"]);
        assert!(matches!(cli.command, Some(Commands::History { limit: 10 })));
    }
}

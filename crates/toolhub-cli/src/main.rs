//! CLI entry point.
//!
//! Commands that talk to tool servers bootstrap an orchestrator, run their
//! handler and always shut the servers down before exiting.

use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use toolhub_cli::handlers::call::CallArgs;
use toolhub_cli::{Cli, CliConfig, CliError, Commands, bootstrap, handlers, open_context};

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    // stdout carries command output only
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    let config = CliConfig::resolve(cli.config.as_deref(), cli.context.as_deref())?;

    match command {
        Commands::Paths => handlers::paths::execute(&config),
        Commands::History { limit } => {
            let context = open_context(&config.context_path).await;
            handlers::history::execute(&context, limit).await
        }
        command => {
            let ctx = bootstrap(&config).await?;
            let outcome = match command {
                Commands::Servers => handlers::servers::execute(&ctx),
                Commands::Tools { server } => handlers::tools::execute(&ctx, server.as_deref()),
                Commands::Call {
                    tool,
                    server,
                    args,
                    fallbacks,
                    user_text,
                } => {
                    handlers::call::execute(
                        &ctx,
                        &CallArgs {
                            tool,
                            server,
                            args,
                            fallbacks,
                            user_text,
                        },
                    )
                    .await
                }
                Commands::Paths | Commands::History { .. } => Ok(()),
            };
            ctx.orchestrator.shutdown().await;
            outcome
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            let code = err.downcast_ref::<CliError>().map_or(1, CliError::exit_code);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

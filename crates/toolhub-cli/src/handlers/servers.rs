//! Servers command handler.

use anyhow::Result;

use crate::bootstrap::CliContext;
use crate::presentation::{format_optional, print_separator, truncate_string};

/// Show the state of every configured server after startup.
pub fn execute(ctx: &CliContext) -> Result<()> {
    let statuses = ctx.orchestrator.server_statuses();

    println!(
        "{} server(s) from {}:\n",
        statuses.len(),
        ctx.config_path.display()
    );
    println!(
        "{:<16} {:<12} {:<6} {:<8} {:<8} Description",
        "Name", "State", "Tools", "PID", "Restarts"
    );
    print_separator(80);

    for status in &statuses {
        println!(
            "{:<16} {:<12} {:<6} {:<8} {:<8} {}",
            truncate_string(&status.name, 15),
            status.state,
            status.tool_count,
            format_optional(status.pid.as_ref(), "--"),
            status.restart_count,
            truncate_string(&status.description, 40),
        );
        if let Some(error) = &status.last_error {
            println!("    error: {error}");
        }
    }

    Ok(())
}

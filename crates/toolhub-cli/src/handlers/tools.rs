//! Tools command handler.

use anyhow::Result;

use crate::bootstrap::CliContext;
use crate::presentation::truncate_string;

/// List discovered tools grouped by server.
pub fn execute(ctx: &CliContext, server: Option<&str>) -> Result<()> {
    let grouped: Vec<_> = ctx
        .orchestrator
        .tools_by_server()
        .into_iter()
        .filter(|(name, _)| server.is_none_or(|wanted| name.as_str() == wanted))
        .collect();

    if grouped.is_empty() {
        match server {
            Some(name) => println!("No tools discovered on '{name}'."),
            None => println!("No tools discovered."),
        }
        return Ok(());
    }

    for (name, tools) in grouped {
        println!("{name} ({} tool(s))", tools.len());
        for tool in tools {
            let description = tool.description.as_deref().unwrap_or("");
            println!(
                "  {:<24} {}",
                tool.qualified_name(),
                truncate_string(description, 60)
            );
        }
        println!();
    }

    Ok(())
}

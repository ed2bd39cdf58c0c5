//! History command handler.
//!
//! Reads the context file only; no server is started.

use anyhow::Result;
use chrono::Local;

use toolhub_core::ContextStore;

use crate::presentation::{print_separator, truncate_string};

/// Print the last `limit` interactions.
pub async fn execute(context: &ContextStore, limit: usize) -> Result<()> {
    let entries = context.recent(limit).await;
    if entries.is_empty() {
        println!("No interactions recorded yet.");
        return Ok(());
    }

    let session = context.session().await;
    println!(
        "{} interaction(s) since {}, last active {}\n",
        session.total_interactions,
        session.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
        session.last_active_at.with_timezone(&Local).format("%Y-%m-%d %H:%M")
    );
    println!("{:<17} {:<28} {:<30} Request", "When", "Tool", "Arguments");
    print_separator(100);

    for entry in entries {
        let tool = match (&entry.server_used, &entry.tool_used) {
            (Some(server), Some(tool)) => format!("{server}.{tool}"),
            (None, Some(tool)) => tool.clone(),
            _ => "--".to_string(),
        };
        let tool = if entry.success {
            tool
        } else {
            format!("{tool} (failed)")
        };
        let arguments = if entry.arguments.is_empty() {
            "--".to_string()
        } else {
            serde_json::Value::Object(entry.arguments.clone()).to_string()
        };
        println!(
            "{:<17} {:<28} {:<30} {}",
            entry.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
            truncate_string(&tool, 27),
            truncate_string(&arguments, 29),
            truncate_string(&entry.user_text, 40)
        );
    }

    Ok(())
}

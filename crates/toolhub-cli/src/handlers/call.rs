//! Call command handler.
//!
//! Invokes one tool, optionally with a fallback chain, prints its output
//! and records the interaction in the context file.

use anyhow::Result;
use serde_json::Value;
use tracing::debug;

use toolhub_core::{ConversationEntry, ToolArguments, ToolResult};
use toolhub_mcp::{ArgumentTransform, DispatchError, Fallback, FallbackChain};

use crate::bootstrap::CliContext;
use crate::error::CliError;

/// Arguments for the call command.
#[derive(Debug, Default)]
pub struct CallArgs {
    pub tool: String,
    pub server: Option<String>,
    pub args: Option<String>,
    pub fallbacks: Vec<String>,
    pub user_text: Option<String>,
}

/// Execute the call command.
pub async fn execute(ctx: &CliContext, call: &CallArgs) -> Result<()> {
    let orchestrator = &ctx.orchestrator;

    let arguments = match call.args.as_deref() {
        Some(raw) => parse_arguments(raw)?,
        None => {
            let remembered = orchestrator.last_arguments_for(&call.tool).await;
            if remembered.is_some() {
                debug!(tool = %call.tool, "Reusing last arguments");
            }
            remembered.unwrap_or_default()
        }
    };
    let chain = parse_fallbacks(&call.fallbacks)?;

    let outcome = orchestrator
        .invoke(
            &call.tool,
            &arguments,
            call.server.as_deref(),
            (!chain.is_empty()).then_some(&chain),
        )
        .await;

    let user_text = call
        .user_text
        .clone()
        .unwrap_or_else(|| format!("call {}", call.tool));
    orchestrator
        .record_interaction(interaction(user_text, call, &arguments, &outcome))
        .await;

    let result = match outcome {
        Ok(result) => result,
        Err(err) => {
            let info = err.info();
            eprintln!("server: {}", info.server.as_deref().unwrap_or("--"));
            eprintln!("tool: {}", info.tool.as_deref().unwrap_or(&call.tool));
            eprintln!("category: {}", info.category);
            return Err(CliError::Dispatch(info).into());
        }
    };

    if let Some(original) = &result.fallback_from {
        eprintln!("note: '{original}' failed, answered by fallback '{}'", result.tool);
    }

    let text = result.text();
    if !text.is_empty() {
        println!("{text}");
    }
    if let Some(structured) = &result.structured {
        println!("{}", serde_json::to_string_pretty(structured)?);
    }

    debug!(
        server = %result.server,
        tool = %result.tool,
        duration_ms = result.duration_ms,
        "Call finished"
    );
    Ok(())
}

/// History entry for one call.
///
/// A success records the tool that answered with the arguments it was sent;
/// a failure records the requested tool with the error as output.
fn interaction(
    user_text: String,
    call: &CallArgs,
    arguments: &ToolArguments,
    outcome: &Result<ToolResult, DispatchError>,
) -> ConversationEntry {
    let entry = ConversationEntry::new(user_text);
    match outcome {
        Ok(result) => entry
            .with_tool(&result.server, &result.tool, result.arguments.clone())
            .with_tool_output(result.text()),
        Err(err) => {
            let mut entry = entry.with_failure(err.to_string());
            entry.server_used = err.server().or(call.server.as_deref()).map(str::to_string);
            entry.tool_used = Some(err.tool().to_string());
            entry.arguments = arguments.clone();
            entry
        }
    }
}

/// Parse `--args` as a JSON object.
pub fn parse_arguments(raw: &str) -> Result<ToolArguments, CliError> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(CliError::Arguments("--args must be a JSON object".to_string())),
        Err(e) => Err(CliError::Arguments(format!("--args is not valid JSON: {e}"))),
    }
}

/// Parse `--fallback` values of the form `TOOL`, `SERVER.TOOL` or
/// `TOOL=JSON`.
///
/// A bare tool reuses the original arguments; a JSON object replaces them.
pub fn parse_fallbacks(values: &[String]) -> Result<FallbackChain, CliError> {
    let mut chain = FallbackChain::new();
    for value in values {
        let (target, transform) = match value.split_once('=') {
            Some((target, raw)) => (target, ArgumentTransform::Replace(parse_arguments(raw)?)),
            None => (value.as_str(), ArgumentTransform::Reuse),
        };
        let target = target.trim();
        if target.is_empty() {
            return Err(CliError::Arguments(format!(
                "--fallback '{value}' names no tool"
            )));
        }
        chain.push(Fallback::new(target).with_transform(transform));
    }
    Ok(chain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_arguments_requires_object() {
        let args = parse_arguments(r#"{"name":"Ada"}"#).unwrap();
        assert_eq!(args.get("name"), Some(&json!("Ada")));

        assert!(matches!(parse_arguments("[1,2]"), Err(CliError::Arguments(_))));
        assert!(matches!(parse_arguments("{oops"), Err(CliError::Arguments(_))));
    }

    #[test]
    fn test_parse_fallbacks() {
        let chain = parse_fallbacks(&[
            r#"quick_palette={"count":3}"#.to_string(),
            "beauty.echo".to_string(),
        ])
        .unwrap();

        let fallbacks: Vec<_> = chain.iter().collect();
        assert_eq!(fallbacks.len(), 2);
        assert_eq!(fallbacks[0].tool, "quick_palette");
        assert!(matches!(
            &fallbacks[0].transform,
            ArgumentTransform::Replace(args) if args.get("count") == Some(&json!(3))
        ));
        assert_eq!(fallbacks[1].tool, "beauty.echo");
        assert!(matches!(fallbacks[1].transform, ArgumentTransform::Reuse));
    }

    fn call_args(tool: &str) -> CallArgs {
        CallArgs {
            tool: tool.to_string(),
            ..CallArgs::default()
        }
    }

    #[test]
    fn test_fallback_interaction_records_arguments_sent() {
        let requested = parse_arguments(r#"{"name":"Ada"}"#).unwrap();
        let sent = parse_arguments(r#"{"count":3}"#).unwrap();
        let outcome = Ok(ToolResult {
            server: "beauty".to_string(),
            tool: "quick_palette".to_string(),
            arguments: sent.clone(),
            content: vec![json!({"type": "text", "text": "palette: #283cc8"})],
            structured: None,
            duration_ms: 4,
            fallback_from: Some("create_profile".to_string()),
        });

        let entry = interaction(
            "make a profile".to_string(),
            &call_args("create_profile"),
            &requested,
            &outcome,
        );
        assert_eq!(entry.tool_used.as_deref(), Some("quick_palette"));
        assert_eq!(entry.arguments, sent);
        assert_eq!(entry.tool_output, "palette: #283cc8");
        assert!(entry.success);
    }

    #[test]
    fn test_failed_call_is_recorded_with_error() {
        let requested = parse_arguments(r#"{"undertone":"warm"}"#).unwrap();
        let outcome = Err(DispatchError::ToolExecution {
            server: "beauty".to_string(),
            tool: "create_profile".to_string(),
            message: "name is required".to_string(),
            code: Some(-32602),
        });

        let entry = interaction(
            "call create_profile".to_string(),
            &call_args("create_profile"),
            &requested,
            &outcome,
        );
        assert_eq!(entry.server_used.as_deref(), Some("beauty"));
        assert_eq!(entry.tool_used.as_deref(), Some("create_profile"));
        assert_eq!(entry.arguments, requested);
        assert!(!entry.success);
        assert!(entry.tool_output.contains("name is required"), "{}", entry.tool_output);
    }

    #[test]
    fn test_parse_fallbacks_rejects_empty_tool() {
        assert!(parse_fallbacks(&["={}".to_string()]).is_err());
    }
}

//! End-to-end orchestration against real `toolhub-demo-server` processes.
//!
//! # What is tested
//!
//! - A server with a missing script is skipped; the others serve tools
//! - A server that dies after `Ready` is restarted exactly once
//! - A remote validation error falls back to an alternative tool
//! - Ambiguous, qualified and unknown tool names
//! - Interactions are recorded and last arguments remembered

mod common;

use common::{Harness, args, demo};
use serde_json::json;
use toolhub_core::ConversationEntry;
use toolhub_mcp::{
    ArgumentTransform, ConnectionState, DispatchError, Fallback, FallbackChain,
    OrchestratorError, ServerDescriptor, StartError,
};

// ── Startup ─────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_script_server_is_skipped() {
    let harness = Harness::start(vec![
        ServerDescriptor::new("sleep", "python3").with_args(["/nonexistent/toolhub/server.py"]),
        demo("beauty"),
    ])
    .await
    .unwrap();
    let orchestrator = &harness.orchestrator;

    let tools = orchestrator.list_available_tools();
    assert!(!tools.is_empty());
    assert!(tools.iter().all(|tool| tool.server_name == "beauty"));

    let failures = orchestrator.startup_failures();
    assert_eq!(failures.len(), 1);
    assert!(matches!(
        &failures[0],
        StartError::LaunchTargetMissing { server, .. } if server == "sleep"
    ));

    let statuses = orchestrator.server_statuses();
    assert_eq!(statuses[0].name, "sleep");
    assert_eq!(statuses[0].state, ConnectionState::Dead);
    assert_eq!(statuses[1].state, ConnectionState::Ready);
    assert!(statuses[1].pid.is_some());

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn no_ready_server_fails_startup() {
    let result = Harness::start(vec![ServerDescriptor::new(
        "ghost",
        "/nonexistent/toolhub/ghost",
    )])
    .await;

    let mut settings = common::fast_settings();
    settings.handshake_timeout_ms = Some(300);
    let quick = Harness::start_with(
        settings,
        vec![demo("mute").with_env("TOOLHUB_DEMO_SILENT_HANDSHAKE", "1")],
    )
    .await;

    for outcome in [result, quick] {
        let Err(OrchestratorError::NoServersReady { failures }) = outcome else {
            panic!("startup should fail");
        };
        assert!(!failures.is_empty());
    }
}

#[tokio::test]
async fn disabled_servers_are_not_started() {
    let harness = Harness::start(vec![demo("on"), demo("off").with_enabled(false)])
        .await
        .unwrap();
    let names: Vec<_> = harness
        .orchestrator
        .server_statuses()
        .into_iter()
        .map(|s| s.name)
        .collect();
    assert_eq!(names, vec!["on"]);
    harness.orchestrator.shutdown().await;
}

#[tokio::test]
async fn stdout_banner_does_not_break_the_session() {
    let harness = Harness::start(vec![
        demo("chatty").with_env("TOOLHUB_DEMO_BANNER", "chatty server v1 starting..."),
    ])
    .await
    .unwrap();

    let result = harness
        .orchestrator
        .invoke("echo", &args(json!({"text": "still fine"})), None, None)
        .await
        .unwrap();
    assert_eq!(result.text(), "still fine");
    harness.orchestrator.shutdown().await;
}

// ── Recovery ────────────────────────────────────────────────────────

#[tokio::test]
async fn server_dying_after_ready_is_unavailable_after_one_restart() {
    let harness = Harness::start(vec![
        demo("flaky").with_env("TOOLHUB_DEMO_EXIT_AFTER_CALLS", "0"),
    ])
    .await
    .unwrap();
    let orchestrator = &harness.orchestrator;

    let err = orchestrator
        .invoke("echo", &args(json!({"text": "hi"})), None, None)
        .await
        .unwrap_err();

    assert!(
        matches!(&err, DispatchError::ServerUnavailable { server, tool, .. } if server == "flaky" && tool == "echo"),
        "{err:?}"
    );
    let stats = orchestrator.stats();
    assert_eq!(stats.restarts, 1);
    assert_eq!(stats.unavailable, 1);
    assert_eq!(orchestrator.server_statuses()[0].restart_count, 1);

    orchestrator.shutdown().await;
}

#[tokio::test]
#[cfg(unix)]
async fn killed_server_is_restarted_and_call_succeeds() {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let harness = Harness::start(vec![demo("worker")]).await.unwrap();
    let orchestrator = &harness.orchestrator;

    let first = orchestrator
        .invoke("whoami", &args(json!({})), None, None)
        .await
        .unwrap();
    let pid = orchestrator.server_statuses()[0].pid.unwrap();
    assert_eq!(first.text(), format!("worker {pid}"));

    kill(Pid::from_raw(i32::try_from(pid).unwrap()), Signal::SIGKILL).unwrap();
    harness.wait_for_state("worker", ConnectionState::Dead).await;

    let second = orchestrator
        .invoke("whoami", &args(json!({})), None, None)
        .await
        .unwrap();
    let new_pid = orchestrator.server_statuses()[0].pid.unwrap();
    assert_ne!(new_pid, pid);
    assert_eq!(second.text(), format!("worker {new_pid}"));
    assert_eq!(orchestrator.stats().restarts, 1);
    assert_eq!(harness.state_of("worker"), ConnectionState::Ready);

    orchestrator.shutdown().await;
}

// ── Fallback ────────────────────────────────────────────────────────

#[tokio::test]
async fn validation_error_falls_back_to_quick_palette() {
    let harness = Harness::start(vec![demo("beauty")]).await.unwrap();
    let orchestrator = &harness.orchestrator;

    let err = orchestrator
        .invoke("create_profile", &args(json!({})), None, None)
        .await
        .unwrap_err();
    assert!(matches!(
        &err,
        DispatchError::ToolExecution { message, code: Some(-32602), .. } if message == "name is required"
    ));

    let chain = FallbackChain::new().then(
        Fallback::new("quick_palette")
            .with_transform(ArgumentTransform::Replace(args(json!({"count": 2})))),
    );
    let result = orchestrator
        .invoke("create_profile", &args(json!({})), None, Some(&chain))
        .await
        .unwrap();

    assert_eq!(result.tool, "quick_palette");
    assert_eq!(result.fallback_from.as_deref(), Some("create_profile"));
    assert_eq!(result.arguments, args(json!({"count": 2})));
    assert!(result.text().starts_with("palette: #"));
    assert_eq!(result.text().split(' ').count(), 3);

    let stats = orchestrator.stats();
    assert_eq!(stats.fallbacks_used, 1);
    assert_eq!(stats.tool_errors, 1);
    assert_eq!(stats.restarts, 0);

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn failing_fallbacks_return_the_original_error() {
    let harness = Harness::start(vec![demo("beauty")]).await.unwrap();

    let chain = FallbackChain::new()
        .then(Fallback::new("no_such_tool"))
        .then(Fallback::new("add").with_transform(ArgumentTransform::Empty));
    let err = harness
        .orchestrator
        .invoke("create_profile", &args(json!({"undertone": "warm"})), None, Some(&chain))
        .await
        .unwrap_err();

    assert_eq!(err.tool(), "create_profile");
    assert!(matches!(err, DispatchError::ToolExecution { .. }));
    harness.orchestrator.shutdown().await;
}

#[tokio::test]
async fn is_error_results_are_tool_errors() {
    let harness = Harness::start(vec![demo("calc")]).await.unwrap();

    let err = harness
        .orchestrator
        .invoke("add", &args(json!({"a": "one"})), None, None)
        .await
        .unwrap_err();
    assert!(matches!(
        &err,
        DispatchError::ToolExecution { message, code: None, .. } if message == "a and b must be numbers"
    ));

    let sum = harness
        .orchestrator
        .invoke("add", &args(json!({"a": 2, "b": 3.5})), None, None)
        .await
        .unwrap();
    assert_eq!(sum.structured, Some(json!({"sum": 5.5})));
    harness.orchestrator.shutdown().await;
}

// ── Routing ─────────────────────────────────────────────────────────

#[tokio::test]
async fn shared_tool_names_need_a_server() {
    let harness = Harness::start(vec![demo("alpha"), demo("beta")]).await.unwrap();
    let orchestrator = &harness.orchestrator;

    let err = orchestrator
        .invoke("whoami", &args(json!({})), None, None)
        .await
        .unwrap_err();
    assert!(matches!(
        &err,
        DispatchError::Ambiguous { candidates, .. } if candidates == &["alpha", "beta"]
    ));

    let qualified = orchestrator
        .invoke("beta.whoami", &args(json!({})), None, None)
        .await
        .unwrap();
    assert!(qualified.text().starts_with("beta "));

    let explicit = orchestrator
        .invoke("whoami", &args(json!({})), Some("alpha"), None)
        .await
        .unwrap();
    assert!(explicit.text().starts_with("alpha "));

    let grouped = orchestrator.tools_by_server();
    assert_eq!(grouped.len(), 2);
    assert_eq!(grouped[0].0, "alpha");

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn unknown_tool_sends_nothing_to_servers() {
    // Any tools/call would make this server exit
    let harness = Harness::start(vec![
        demo("tripwire").with_env("TOOLHUB_DEMO_EXIT_AFTER_CALLS", "0"),
    ])
    .await
    .unwrap();

    let err = harness
        .orchestrator
        .invoke("launch_rockets", &args(json!({})), None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::NotFound { server: None, .. }));

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert_eq!(harness.state_of("tripwire"), ConnectionState::Ready);
    assert_eq!(harness.orchestrator.stats().routing_failures, 1);
    harness.orchestrator.shutdown().await;
}

// ── Context ─────────────────────────────────────────────────────────

#[tokio::test]
async fn interactions_are_recorded_and_persisted() {
    let harness = Harness::start(vec![demo("beauty")]).await.unwrap();
    let orchestrator = &harness.orchestrator;

    let arguments = args(json!({"name": "Ada", "undertone": "cool"}));
    let result = orchestrator
        .invoke("create_profile", &arguments, None, None)
        .await
        .unwrap();
    orchestrator
        .record_interaction(
            ConversationEntry::new("make a profile for Ada")
                .with_tool(&result.server, &result.tool, arguments.clone())
                .with_tool_output(result.text())
                .with_final_text("Done."),
        )
        .await;
    orchestrator
        .record_interaction(
            ConversationEntry::new("again").with_tool("beauty", "create_profile", args(json!({}))),
        )
        .await;

    assert_eq!(
        orchestrator.last_arguments_for("create_profile").await,
        Some(arguments)
    );
    assert_eq!(orchestrator.recent_history(5).await.len(), 2);

    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&harness.context_path).unwrap()).unwrap();
    assert_eq!(saved["servers"], json!(["beauty"]));
    assert_eq!(saved["session"]["totalInteractions"], 2);
    assert_eq!(
        saved["history"][0]["toolOutput"],
        "Profile created for Ada"
    );

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn shutdown_stops_every_server() {
    let harness = Harness::start(vec![demo("one"), demo("two")]).await.unwrap();
    harness.orchestrator.shutdown().await;

    for status in harness.orchestrator.server_statuses() {
        assert_eq!(status.state, ConnectionState::Dead, "{}", status.name);
    }
}

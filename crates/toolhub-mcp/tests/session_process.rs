//! Supervisor and session behaviour against a real child process.

mod common;

use std::time::Duration;

use common::{args, demo, fast_settings};
use serde_json::json;
use toolhub_mcp::{ConnectionState, SessionError, StartError, Supervisor};

#[tokio::test]
async fn sequential_calls_use_increasing_ids() {
    let supervisor = Supervisor::new(fast_settings());
    let connection = supervisor.start(&demo("counter")).await.unwrap();
    let timeout = Duration::from_secs(5);

    // initialize used id 1
    assert_eq!(connection.session().peek_next_id(), 2);

    for i in 0..10_u64 {
        let before = connection.session().peek_next_id();
        let result = connection
            .call_tool("echo", &args(json!({"text": i.to_string()})), timeout)
            .await
            .unwrap();
        assert_eq!(result.text(), i.to_string());
        assert_eq!(connection.session().peek_next_id(), before + 1);
    }

    supervisor.stop(&connection).await;
    assert!(!supervisor.is_alive(&connection));
}

#[tokio::test]
async fn timed_out_response_is_drained_before_next_call() {
    let supervisor = Supervisor::new(fast_settings());
    let connection = supervisor.start(&demo("sloth")).await.unwrap();

    let err = connection
        .call_tool("slow", &args(json!({"ms": 600})), Duration::from_millis(150))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Timeout { .. }), "{err:?}");
    assert_eq!(connection.state(), ConnectionState::Degraded);

    let result = connection
        .call_tool("echo", &args(json!({"text": "after"})), Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(result.text(), "after");
    assert_eq!(connection.state(), ConnectionState::Ready);

    supervisor.stop(&connection).await;
}

#[tokio::test]
async fn silent_handshake_times_out() {
    let mut settings = fast_settings();
    settings.handshake_timeout_ms = Some(300);
    let supervisor = Supervisor::new(settings);

    let err = supervisor
        .start(&demo("mute").with_env("TOOLHUB_DEMO_SILENT_HANDSHAKE", "1"))
        .await
        .unwrap_err();

    let StartError::HandshakeFailed { server, reason } = err else {
        panic!("expected a handshake failure");
    };
    assert_eq!(server, "mute");
    assert!(reason.contains("initialize"), "{reason}");
}

#[tokio::test]
async fn restart_replaces_the_process() {
    let supervisor = Supervisor::new(fast_settings());
    let first = supervisor.start(&demo("phoenix")).await.unwrap();
    let first_pid = first.pid().unwrap();

    let second = supervisor.restart(&first).await.unwrap();

    assert!(!first.is_alive());
    assert_eq!(first.state(), ConnectionState::Dead);
    assert!(second.is_alive());
    assert_ne!(second.pid(), Some(first_pid));
    assert_eq!(second.restart_count(), 1);

    let tools = second.discover_tools(Duration::from_secs(5)).await.unwrap();
    assert!(tools.iter().any(|tool| tool.name == "whoami"));

    supervisor.stop(&second).await;
}

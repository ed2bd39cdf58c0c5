//! In-memory fake server for session-level unit tests.

use std::time::Duration;

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

use crate::session::McpSession;

const PIPE_CAPACITY: usize = 64 * 1024;

/// The server side of an in-memory session.
pub struct FakeServer {
    requests: BufReader<DuplexStream>,
    responses: DuplexStream,
}

/// A session wired to a [`FakeServer`].
pub fn session_pair(name: &str) -> (McpSession, FakeServer) {
    let (client_out, server_in) = tokio::io::duplex(PIPE_CAPACITY);
    let (server_out, client_in) = tokio::io::duplex(PIPE_CAPACITY);
    let session = McpSession::new(name, client_in, client_out);
    (
        session,
        FakeServer {
            requests: BufReader::new(server_in),
            responses: server_out,
        },
    )
}

impl FakeServer {
    /// Next message written by the session.
    pub async fn recv(&mut self) -> Value {
        let mut line = String::new();
        let read = tokio::time::timeout(Duration::from_secs(5), self.requests.read_line(&mut line))
            .await
            .expect("session did not write in time")
            .expect("read from session");
        assert!(read > 0, "session closed its writer");
        serde_json::from_str(&line).expect("session wrote invalid JSON")
    }

    /// Next message if one arrives within `wait`.
    pub async fn try_recv_within(&mut self, wait: Duration) -> Option<Value> {
        let mut line = String::new();
        match tokio::time::timeout(wait, self.requests.read_line(&mut line)).await {
            Ok(Ok(n)) if n > 0 => serde_json::from_str(&line).ok(),
            _ => None,
        }
    }

    pub async fn send(&mut self, message: Value) {
        let mut line = serde_json::to_string(&message).unwrap();
        line.push('\n');
        self.send_raw(&line).await;
    }

    pub async fn send_raw(&mut self, raw: &str) {
        self.responses.write_all(raw.as_bytes()).await.unwrap();
        self.responses.flush().await.unwrap();
    }

    pub async fn reply(&mut self, request: &Value, result: Value) {
        self.send(json!({"jsonrpc": "2.0", "id": request["id"], "result": result}))
            .await;
    }

    pub async fn reply_error(&mut self, request: &Value, code: i64, message: &str) {
        self.send(json!({
            "jsonrpc": "2.0",
            "id": request["id"],
            "error": {"code": code, "message": message}
        }))
        .await;
    }
}

/// Answers `tools/call` for a scripted server: `(tool, arguments) -> result`.
pub type CallHandler = fn(&str, &Value) -> Value;

/// A `Ready` session backed by a task that serves `tools` and answers calls
/// with `handler`. The task ends when the session is dropped.
pub async fn scripted_session(name: &str, tools: Vec<Value>, handler: CallHandler) -> McpSession {
    let (session, server) = session_pair(name);
    tokio::spawn(serve_scripted(server, tools, handler));
    session
        .initialize("toolhub-test", Duration::from_secs(5))
        .await
        .expect("scripted handshake");
    session
}

async fn serve_scripted(mut server: FakeServer, tools: Vec<Value>, handler: CallHandler) {
    loop {
        let mut line = String::new();
        match server.requests.read_line(&mut line).await {
            Ok(n) if n > 0 => {}
            _ => return,
        }
        let Ok(message) = serde_json::from_str::<Value>(&line) else {
            continue;
        };
        if message.get("id").is_none() {
            continue;
        }
        let result = match message["method"].as_str() {
            Some("initialize") => json!({
                "protocolVersion": crate::protocol::PROTOCOL_VERSION,
                "capabilities": {"tools": {}}
            }),
            Some("tools/list") => json!({ "tools": tools }),
            Some("tools/call") => {
                let tool = message["params"]["name"].as_str().unwrap_or_default();
                handler(tool, &message["params"]["arguments"])
            }
            _ => json!({}),
        };
        let reply = json!({"jsonrpc": "2.0", "id": message["id"], "result": result});
        let mut out = reply.to_string();
        out.push('\n');
        if server.responses.write_all(out.as_bytes()).await.is_err() {
            return;
        }
    }
}

/// Text result in the shape servers return from `tools/call`.
pub fn text_result(text: &str) -> Value {
    json!({"content": [{"type": "text", "text": text}]})
}

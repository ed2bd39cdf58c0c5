//! Minimal tool server speaking the toolhub wire protocol on stdio.
//!
//! Used for local trials and by the integration tests. Behaviour knobs:
//!
//! - `TOOLHUB_DEMO_NAME`: name reported in `serverInfo` and by `whoami`
//! - `TOOLHUB_DEMO_SILENT_HANDSHAKE`: never answer `initialize`
//! - `TOOLHUB_DEMO_EXIT_AFTER_CALLS=n`: exit without answering the
//!   `tools/call` that arrives after `n` calls were served
//! - `TOOLHUB_DEMO_BANNER`: line printed on stdout before serving

use std::env;
use std::io::{self, BufRead, Write};
use std::thread;
use std::time::Duration;

use serde_json::{Map, Value, json};
use toolhub_mcp::protocol::{
    JsonRpcError, JsonRpcResponse, PROTOCOL_VERSION, error_codes, methods,
};

struct DemoServer {
    name: String,
    silent_handshake: bool,
    exit_after_calls: Option<u64>,
    calls_served: u64,
}

impl DemoServer {
    fn from_env() -> Self {
        Self {
            name: env::var("TOOLHUB_DEMO_NAME").unwrap_or_else(|_| "demo".to_string()),
            silent_handshake: env::var_os("TOOLHUB_DEMO_SILENT_HANDSHAKE").is_some(),
            exit_after_calls: env::var("TOOLHUB_DEMO_EXIT_AFTER_CALLS")
                .ok()
                .and_then(|v| v.parse().ok()),
            calls_served: 0,
        }
    }

    /// Reply for one request, or `None` when nothing should be sent.
    fn handle(&mut self, id: Value, method: &str, params: &Value) -> Option<JsonRpcResponse> {
        let outcome = match method {
            methods::INITIALIZE if self.silent_handshake => return None,
            methods::INITIALIZE => Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": { "name": self.name, "version": env!("CARGO_PKG_VERSION") }
            })),
            methods::PING => Ok(json!({})),
            methods::TOOLS_LIST => Ok(json!({ "tools": tool_list() })),
            methods::TOOLS_CALL => {
                if self
                    .exit_after_calls
                    .is_some_and(|limit| self.calls_served >= limit)
                {
                    eprintln!("{}: call limit reached, exiting", self.name);
                    std::process::exit(0);
                }
                self.calls_served += 1;
                self.call_tool(params)
            }
            other => Err(JsonRpcError::new(
                error_codes::METHOD_NOT_FOUND,
                format!("Method not found: {other}"),
            )),
        };

        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::failure(id, error),
        })
    }

    fn call_tool(&self, params: &Value) -> Result<Value, JsonRpcError> {
        let tool = params.get("name").and_then(Value::as_str).unwrap_or_default();
        let empty = Map::new();
        let args = params
            .get("arguments")
            .and_then(Value::as_object)
            .unwrap_or(&empty);

        match tool {
            "echo" => Ok(text(args.get("text").and_then(Value::as_str).unwrap_or_default())),
            "add" => {
                let (Some(a), Some(b)) = (
                    args.get("a").and_then(Value::as_f64),
                    args.get("b").and_then(Value::as_f64),
                ) else {
                    return Ok(json!({
                        "content": [{ "type": "text", "text": "a and b must be numbers" }],
                        "isError": true
                    }));
                };
                let sum = a + b;
                Ok(json!({
                    "content": [{ "type": "text", "text": sum.to_string() }],
                    "structuredContent": { "sum": sum }
                }))
            }
            "create_profile" => match args.get("name").and_then(Value::as_str) {
                Some(name) if !name.trim().is_empty() => {
                    Ok(text(&format!("Profile created for {name}")))
                }
                _ => Err(JsonRpcError::new(
                    error_codes::INVALID_PARAMS,
                    "name is required",
                )),
            },
            "quick_palette" => {
                let count = args.get("count").and_then(Value::as_u64).unwrap_or(3).min(8);
                let palette: Vec<String> = (0..count)
                    .map(|i| format!("#{:02x}{:02x}{:02x}", 40 + i * 25, 90 + i * 15, 200 - i * 20))
                    .collect();
                Ok(text(&format!("palette: {}", palette.join(" "))))
            }
            "slow" => {
                let ms = args.get("ms").and_then(Value::as_u64).unwrap_or(1000);
                thread::sleep(Duration::from_millis(ms));
                Ok(text(&format!("slept {ms}ms")))
            }
            "whoami" => Ok(text(&format!("{} {}", self.name, std::process::id()))),
            other => Err(JsonRpcError::new(
                error_codes::INVALID_PARAMS,
                format!("Unknown tool: {other}"),
            )),
        }
    }
}

fn text(text: &str) -> Value {
    json!({ "content": [{ "type": "text", "text": text }] })
}

fn tool_list() -> Value {
    json!([
        {
            "name": "echo",
            "description": "Return the given text",
            "inputSchema": {
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            }
        },
        {
            "name": "add",
            "description": "Add two numbers",
            "inputSchema": {
                "type": "object",
                "properties": { "a": { "type": "number" }, "b": { "type": "number" } },
                "required": ["a", "b"]
            }
        },
        {
            "name": "create_profile",
            "description": "Create a colour profile for a named person",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "undertone": { "type": "string" }
                },
                "required": ["name"]
            }
        },
        {
            "name": "quick_palette",
            "description": "A palette that needs no profile",
            "inputSchema": {
                "type": "object",
                "properties": { "count": { "type": "integer" } }
            }
        },
        {
            "name": "slow",
            "description": "Sleep before answering",
            "inputSchema": {
                "type": "object",
                "properties": { "ms": { "type": "integer" } }
            }
        },
        {
            "name": "whoami",
            "description": "Server name and process id",
            "inputSchema": { "type": "object" }
        }
    ])
}

fn main() -> io::Result<()> {
    let mut server = DemoServer::from_env();
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    eprintln!("{}: serving on stdio", server.name);
    if let Ok(banner) = env::var("TOOLHUB_DEMO_BANNER") {
        writeln!(stdout, "{banner}")?;
        stdout.flush()?;
    }

    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let Ok(message) = serde_json::from_str::<Value>(&line) else {
            continue;
        };

        // Notifications carry no id and get no reply
        let Some(id) = message.get("id").cloned() else {
            continue;
        };
        let method = message.get("method").and_then(Value::as_str).unwrap_or_default();
        let params = message.get("params").cloned().unwrap_or(Value::Null);

        if let Some(reply) = server.handle(id, method, &params) {
            let encoded = serde_json::to_string(&reply).map_err(io::Error::other)?;
            writeln!(stdout, "{encoded}")?;
            stdout.flush()?;
        }
    }

    Ok(())
}

//! Protocol session over one server's byte streams.
//!
//! A session owns the reader and writer for one server, allocates request
//! ids, and matches each response to the single outstanding request. Calls
//! are serialized by the I/O mutex, so at most one request is ever pending.
//!
//! The line buffer and the pending request live in the session rather than
//! in a call's future. If a call is cancelled or times out, the partial line
//! survives and the abandoned response is read and discarded before the
//! next request is written.

use std::io::ErrorKind;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{Mutex, watch};
use tracing::{debug, warn};

use toolhub_core::{ConnectionState, ToolArguments};

use crate::error::SessionError;
use crate::protocol::{
    CallToolResult, Incoming, InitializeResult, JsonRpcError, JsonRpcNotification,
    JsonRpcRequest, JsonRpcResponse, PROTOCOL_VERSION, ToolSchema, ToolsListResult, error_codes,
    methods,
};

/// Upper bound on `tools/list` pages followed for one discovery.
const MAX_TOOL_PAGES: usize = 64;

/// A request written to the server whose response has not been read yet.
#[derive(Debug, Clone)]
struct PendingRequest {
    id: u64,
    method: String,
    issued_at: Instant,
}

struct SessionIo {
    reader: Box<dyn AsyncBufRead + Send + Unpin>,
    writer: Box<dyn AsyncWrite + Send + Unpin>,
    /// Bytes of the line currently being read.
    line: Vec<u8>,
    pending: Option<PendingRequest>,
    /// Set while a request line is being written; a cancelled write leaves
    /// a partial line on the server's stdin.
    writing: bool,
}

/// Protocol session with one tool server.
pub struct McpSession {
    server_name: String,
    io: Mutex<SessionIo>,
    next_id: AtomicU64,
    state: Arc<watch::Sender<ConnectionState>>,
    init: OnceLock<InitializeResult>,
}

impl McpSession {
    /// Create a session over a server's stdout (`reader`) and stdin (`writer`).
    ///
    /// The session starts in `Spawning`; call [`initialize`](Self::initialize)
    /// to perform the handshake.
    pub fn new<R, W>(server_name: impl Into<String>, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (state, _) = watch::channel(ConnectionState::Spawning);
        Self {
            server_name: server_name.into(),
            io: Mutex::new(SessionIo {
                reader: Box::new(BufReader::new(reader)),
                writer: Box::new(writer),
                line: Vec::new(),
                pending: None,
                writing: false,
            }),
            next_id: AtomicU64::new(1),
            state: Arc::new(state),
            init: OnceLock::new(),
        }
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Shared state cell, for the process monitor.
    pub fn state_handle(&self) -> Arc<watch::Sender<ConnectionState>> {
        Arc::clone(&self.state)
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Result of the handshake, once it has completed.
    pub fn initialize_result(&self) -> Option<&InitializeResult> {
        self.init.get()
    }

    /// Move to `Dead`. Terminal; later calls fail with `Closed`.
    pub fn mark_dead(&self, reason: &str) {
        let changed = self.state.send_if_modified(|current| {
            if current.is_dead() {
                return false;
            }
            *current = ConnectionState::Dead;
            true
        });
        if changed {
            warn!(server_name = %self.server_name, reason = %reason, "Connection marked dead");
        }
    }

    fn set_state(&self, next: ConnectionState) {
        self.state.send_if_modified(|current| {
            if current.is_dead() || *current == next {
                return false;
            }
            debug!(
                server_name = %self.server_name,
                from = %current,
                to = %next,
                "Connection state change"
            );
            *current = next;
            true
        });
    }

    /// Perform the `initialize` / `notifications/initialized` handshake.
    ///
    /// On success the session is `Ready`; on any failure it is `Dead`.
    pub async fn initialize(
        &self,
        client_name: &str,
        timeout: Duration,
    ) -> Result<&InitializeResult, SessionError> {
        self.set_state(ConnectionState::Handshaking);

        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "clientInfo": {
                "name": client_name,
                "version": env!("CARGO_PKG_VERSION")
            },
            "capabilities": {}
        });

        let outcome = async {
            let result: InitializeResult = self
                .exchange_typed(methods::INITIALIZE, Some(params), timeout)
                .await?;
            self.notify(methods::INITIALIZED, None).await?;
            Ok::<_, SessionError>(result)
        }
        .await;

        match outcome {
            Ok(result) => {
                debug!(
                    server_name = %self.server_name,
                    server_info = ?result.server_info.as_ref().map(|i| &i.name),
                    protocol_version = ?result.protocol_version,
                    "Handshake complete"
                );
                let stored = self.init.get_or_init(|| result);
                self.set_state(ConnectionState::Ready);
                Ok(stored)
            }
            Err(e) => {
                self.mark_dead(&format!("handshake failed: {e}"));
                Err(e)
            }
        }
    }

    /// List the server's tools, following pagination.
    ///
    /// Returns an empty list without sending anything when the server did
    /// not advertise the `tools` capability.
    pub async fn list_tools(&self, timeout: Duration) -> Result<Vec<ToolSchema>, SessionError> {
        let supports_tools = self
            .init
            .get()
            .is_some_and(|init| init.capabilities.supports_tools());
        if !supports_tools {
            return Ok(Vec::new());
        }

        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        for _ in 0..MAX_TOOL_PAGES {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let page: ToolsListResult = self.request(methods::TOOLS_LIST, params, timeout).await?;
            tools.extend(page.tools);

            match page.next_cursor {
                Some(next) if Some(&next) != cursor.as_ref() => cursor = Some(next),
                _ => return Ok(tools),
            }
        }

        warn!(
            server_name = %self.server_name,
            pages = MAX_TOOL_PAGES,
            "Stopped following tools/list pagination"
        );
        Ok(tools)
    }

    /// Call a tool. A result with `isError: true` is returned as `Ok`; the
    /// caller decides how to treat it.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: &ToolArguments,
        timeout: Duration,
    ) -> Result<CallToolResult, SessionError> {
        let params = json!({
            "name": name,
            "arguments": arguments,
        });
        self.request(methods::TOOLS_CALL, Some(params), timeout).await
    }

    /// Send a request and deserialize its result.
    ///
    /// Outcomes drive the state machine: success returns `Degraded` to
    /// `Ready`, a timeout or transport error degrades a `Ready` session, and
    /// EOF or a protocol violation kills it.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<T, SessionError> {
        if !self.state().is_callable() {
            return Err(SessionError::Closed);
        }

        let result = self.exchange_typed(method, params, timeout).await;
        match &result {
            Ok(_) | Err(SessionError::Remote { .. }) => {
                if self.state() == ConnectionState::Degraded {
                    self.set_state(ConnectionState::Ready);
                }
            }
            Err(SessionError::Timeout { .. } | SessionError::Transport(_)) => {
                if self.state() == ConnectionState::Ready {
                    self.set_state(ConnectionState::Degraded);
                }
            }
            Err(SessionError::Closed | SessionError::Protocol(_)) => {}
        }
        result
    }

    async fn exchange_typed<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<T, SessionError> {
        let value = self.exchange(method, params, timeout).await?;
        serde_json::from_value(value).map_err(|e| {
            let error = SessionError::Protocol(format!("Malformed result for '{method}': {e}"));
            self.mark_dead(&error.to_string());
            error
        })
    }

    /// One request/response round trip under the I/O lock.
    ///
    /// The timeout starts once the lock is held.
    async fn exchange(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, SessionError> {
        if self.state().is_dead() {
            return Err(SessionError::Closed);
        }

        let mut io = self.io.lock().await;
        let result = self.exchange_locked(&mut io, method, params, timeout).await;

        if let Err(e) = &result {
            if e.is_fatal() {
                self.mark_dead(&e.to_string());
            }
        }
        result
    }

    async fn exchange_locked(
        &self,
        io: &mut SessionIo,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, SessionError> {
        if io.writing {
            return Err(SessionError::Protocol(
                "A previous request was interrupted mid-write".to_string(),
            ));
        }

        let round_trip = async {
            // Draining a stale response spends this call's budget
            if let Some(abandoned) = io.pending.clone() {
                self.drain_abandoned(io, &abandoned).await?;
            }

            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            let mut line = serde_json::to_vec(&JsonRpcRequest::new(id, method, params))
                .map_err(|e| SessionError::Protocol(format!("Failed to encode request: {e}")))?;
            line.push(b'\n');

            io.writing = true;
            io.writer.write_all(&line).await.map_err(write_error)?;
            io.writer.flush().await.map_err(write_error)?;
            io.writing = false;
            io.pending = Some(PendingRequest {
                id,
                method: method.to_string(),
                issued_at: Instant::now(),
            });
            self.read_response(io, id).await
        };

        match tokio::time::timeout(timeout, round_trip).await {
            Ok(Ok(outcome)) => {
                io.pending = None;
                outcome.map_err(|e| SessionError::Remote {
                    code: e.code,
                    message: e.message,
                    data: e.data,
                })
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                debug!(
                    server_name = %self.server_name,
                    method = %method,
                    pending = ?io.pending.as_ref().map(|p| p.id),
                    "Request timed out; response will be discarded"
                );
                Err(SessionError::Timeout {
                    method: method.to_string(),
                    timeout,
                })
            }
        }
    }

    /// Read and discard the response to an abandoned request.
    ///
    /// Runs inside the caller's timeout. If that expires first, the request
    /// stays pending and the next call drains it again.
    async fn drain_abandoned(
        &self,
        io: &mut SessionIo,
        abandoned: &PendingRequest,
    ) -> Result<(), SessionError> {
        debug!(
            server_name = %self.server_name,
            id = abandoned.id,
            method = %abandoned.method,
            age_ms = u64::try_from(abandoned.issued_at.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Draining abandoned response"
        );

        self.read_response(io, abandoned.id).await?;
        io.pending = None;
        Ok(())
    }

    /// Read lines until the response for `expected` arrives.
    ///
    /// Noise, notifications and server requests are handled inline. A
    /// response for any other id is a protocol violation.
    async fn read_response(
        &self,
        io: &mut SessionIo,
        expected: u64,
    ) -> Result<Result<Value, JsonRpcError>, SessionError> {
        loop {
            let read = io.reader.read_until(b'\n', &mut io.line).await?;
            if read == 0 {
                if io.line.is_empty() {
                    return Err(SessionError::Closed);
                }
                // Final line without a trailing newline; handle it, then EOF.
            }

            let incoming = Incoming::parse(&io.line);
            if incoming.is_none() && !io.line.trim_ascii().is_empty() {
                debug!(
                    server_name = %self.server_name,
                    line = %String::from_utf8_lossy(io.line.trim_ascii()),
                    "Skipping non-JSON-RPC output"
                );
            }
            io.line.clear();

            match incoming {
                None => {}
                Some(Incoming::Notification { method }) => {
                    debug!(server_name = %self.server_name, method = %method, "Ignoring server notification");
                }
                Some(Incoming::Request { id, method }) => {
                    debug!(server_name = %self.server_name, method = %method, "Rejecting server request");
                    let reply = JsonRpcResponse::failure(
                        id,
                        JsonRpcError::new(
                            error_codes::METHOD_NOT_FOUND,
                            format!("Method not found: {method}"),
                        ),
                    );
                    write_line(&mut *io.writer, &reply).await?;
                }
                Some(Incoming::Response { id, outcome }) => {
                    if id.as_u64() == Some(expected) || (id.is_null() && outcome.is_err()) {
                        return Ok(outcome);
                    }
                    return Err(SessionError::Protocol(format!(
                        "Response id {id} does not match pending request {expected}"
                    )));
                }
            }

            if read == 0 {
                return Err(SessionError::Closed);
            }
        }
    }

    /// Send a notification.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), SessionError> {
        let mut io = self.io.lock().await;
        if io.writing {
            return Err(SessionError::Protocol(
                "A previous request was interrupted mid-write".to_string(),
            ));
        }
        io.writing = true;
        write_line(&mut *io.writer, &JsonRpcNotification::new(method, params)).await?;
        io.writing = false;
        Ok(())
    }

    /// Id that the next request will use.
    pub fn peek_next_id(&self) -> u64 {
        self.next_id.load(Ordering::SeqCst)
    }
}

/// A closed stdin means the server is gone.
fn write_error(e: std::io::Error) -> SessionError {
    match e.kind() {
        ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::UnexpectedEof => {
            SessionError::Closed
        }
        _ => SessionError::Transport(e),
    }
}

async fn write_line<W, T>(writer: &mut W, message: &T) -> Result<(), SessionError>
where
    W: AsyncWrite + Unpin + ?Sized,
    T: serde::Serialize,
{
    let mut line = serde_json::to_vec(message)
        .map_err(|e| SessionError::Protocol(format!("Failed to encode message: {e}")))?;
    line.push(b'\n');
    writer.write_all(&line).await.map_err(write_error)?;
    writer.flush().await.map_err(write_error)?;
    Ok(())
}

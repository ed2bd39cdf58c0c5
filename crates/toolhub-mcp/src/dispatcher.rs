//! Tool invocation: resolve, call, recover once, fall back.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use toolhub_core::{ToolArguments, ToolDescriptor, ToolResult};

use crate::catalog::CatalogRegistry;
use crate::connection::ServerConnection;
use crate::error::{DispatchError, SessionError};
use crate::pool::{ConnectionPool, RestartOutcome};

/// How a fallback derives its arguments from the original call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "arguments", rename_all = "snake_case")]
pub enum ArgumentTransform {
    /// Same arguments as the original call.
    #[default]
    Reuse,
    /// Fixed arguments.
    Replace(ToolArguments),
    /// Original arguments with these keys overlaid.
    Merge(ToolArguments),
    /// No arguments.
    Empty,
}

impl ArgumentTransform {
    pub fn apply(&self, original: &ToolArguments) -> ToolArguments {
        match self {
            Self::Reuse => original.clone(),
            Self::Replace(arguments) => arguments.clone(),
            Self::Merge(overlay) => {
                let mut merged = original.clone();
                merged.extend(overlay.iter().map(|(k, v)| (k.clone(), v.clone())));
                merged
            }
            Self::Empty => ToolArguments::new(),
        }
    }
}

/// One alternative tried when a call fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fallback {
    pub tool: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(default)]
    pub transform: ArgumentTransform,
}

impl Fallback {
    pub fn new(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            server: None,
            transform: ArgumentTransform::Reuse,
        }
    }

    #[must_use]
    pub fn on_server(mut self, server: impl Into<String>) -> Self {
        self.server = Some(server.into());
        self
    }

    #[must_use]
    pub fn with_transform(mut self, transform: ArgumentTransform) -> Self {
        self.transform = transform;
        self
    }
}

/// Ordered alternatives for one invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FallbackChain(Vec<Fallback>);

impl FallbackChain {
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    #[must_use]
    pub fn then(mut self, fallback: Fallback) -> Self {
        self.0.push(fallback);
        self
    }

    pub fn push(&mut self, fallback: Fallback) {
        self.0.push(fallback);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Fallback> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl From<Vec<Fallback>> for FallbackChain {
    fn from(fallbacks: Vec<Fallback>) -> Self {
        Self(fallbacks)
    }
}

/// Invocation counters.
#[derive(Debug, Default)]
pub struct InvocationStats {
    invocations: AtomicU64,
    successes: AtomicU64,
    tool_errors: AtomicU64,
    unavailable: AtomicU64,
    routing_failures: AtomicU64,
    fallbacks_used: AtomicU64,
    restarts: AtomicU64,
}

/// Point-in-time copy of [`InvocationStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub invocations: u64,
    pub successes: u64,
    pub tool_errors: u64,
    pub unavailable: u64,
    pub routing_failures: u64,
    pub fallbacks_used: u64,
    pub restarts: u64,
}

impl InvocationStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failure(&self, error: &DispatchError) {
        match error {
            DispatchError::NotFound { .. } | DispatchError::Ambiguous { .. } => {
                Self::bump(&self.routing_failures);
            }
            DispatchError::ToolExecution { .. } => Self::bump(&self.tool_errors),
            DispatchError::ServerUnavailable { .. } => Self::bump(&self.unavailable),
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            invocations: self.invocations.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            tool_errors: self.tool_errors.load(Ordering::Relaxed),
            unavailable: self.unavailable.load(Ordering::Relaxed),
            routing_failures: self.routing_failures.load(Ordering::Relaxed),
            fallbacks_used: self.fallbacks_used.load(Ordering::Relaxed),
            restarts: self.restarts.load(Ordering::Relaxed),
        }
    }
}

/// A failed call, split by whether the connection is still trustworthy.
enum CallFailure {
    /// The server answered with an error.
    Tool(DispatchError),
    /// Timeout, desync or a dead connection.
    Transport(SessionError),
}

/// Routes tool calls to servers.
pub struct Dispatcher {
    pool: Arc<ConnectionPool>,
    catalog: Arc<CatalogRegistry>,
    stats: InvocationStats,
    call_timeout: Duration,
    discovery_timeout: Duration,
}

impl Dispatcher {
    pub fn new(pool: Arc<ConnectionPool>, catalog: Arc<CatalogRegistry>) -> Self {
        let settings = pool.supervisor().settings();
        let call_timeout = settings.call_timeout();
        let discovery_timeout = settings.discovery_timeout();
        Self {
            pool,
            catalog,
            stats: InvocationStats::default(),
            call_timeout,
            discovery_timeout,
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Invoke a tool.
    ///
    /// On failure each fallback is tried in order; the first success is
    /// returned with `fallback_from` set. When every fallback fails too, the
    /// original error is returned.
    pub async fn invoke(
        &self,
        tool: &str,
        arguments: &ToolArguments,
        explicit_server: Option<&str>,
        fallbacks: Option<&FallbackChain>,
    ) -> Result<ToolResult, DispatchError> {
        InvocationStats::bump(&self.stats.invocations);

        let error = match self.invoke_once(tool, arguments, explicit_server).await {
            Ok(result) => {
                InvocationStats::bump(&self.stats.successes);
                return Ok(result);
            }
            Err(error) => error,
        };

        for fallback in fallbacks.into_iter().flat_map(FallbackChain::iter) {
            let alternative_args = fallback.transform.apply(arguments);
            debug!(
                tool = %tool,
                fallback = %fallback.tool,
                error = %error,
                "Trying fallback"
            );
            match self
                .invoke_once(&fallback.tool, &alternative_args, fallback.server.as_deref())
                .await
            {
                Ok(mut result) => {
                    info!(tool = %tool, fallback = %fallback.tool, server_name = %result.server, "Fallback succeeded");
                    result.fallback_from = Some(tool.to_string());
                    InvocationStats::bump(&self.stats.fallbacks_used);
                    InvocationStats::bump(&self.stats.successes);
                    return Ok(result);
                }
                Err(e) => {
                    debug!(fallback = %fallback.tool, error = %e, "Fallback failed");
                }
            }
        }

        self.stats.record_failure(&error);
        Err(error)
    }

    /// Resolve and call one tool, restarting its server at most once.
    async fn invoke_once(
        &self,
        tool: &str,
        arguments: &ToolArguments,
        explicit_server: Option<&str>,
    ) -> Result<ToolResult, DispatchError> {
        let descriptor = self.catalog.resolve(tool, explicit_server)?;
        let server = descriptor.server_name.as_str();

        let Some(connection) = self.pool.get(server) else {
            return Err(DispatchError::ServerUnavailable {
                server: server.to_string(),
                tool: descriptor.name.clone(),
                reason: "server is not running".to_string(),
            });
        };

        let first_failure = match self.call(&connection, &descriptor, arguments).await {
            Ok(result) => return Ok(result),
            Err(CallFailure::Tool(error)) => return Err(error),
            Err(CallFailure::Transport(error)) => error,
        };

        warn!(
            server_name = %server,
            tool = %descriptor.name,
            state = %connection.state(),
            error = %first_failure,
            "Call failed, restarting server"
        );

        let fresh = match self.pool.restart(server, &connection).await {
            Ok(RestartOutcome::Restarted(fresh)) => {
                self.stats.restarts.fetch_add(1, Ordering::Relaxed);
                self.rediscover(&fresh).await;
                fresh
            }
            Ok(RestartOutcome::Reused(fresh)) => fresh,
            Err(error) => {
                self.catalog.remove_server(server);
                return Err(DispatchError::ServerUnavailable {
                    server: server.to_string(),
                    tool: descriptor.name.clone(),
                    reason: format!("{first_failure}; restart failed: {error}"),
                });
            }
        };

        match self.call(&fresh, &descriptor, arguments).await {
            Ok(result) => Ok(result),
            Err(CallFailure::Tool(error)) => Err(error),
            Err(CallFailure::Transport(error)) => Err(DispatchError::ServerUnavailable {
                server: server.to_string(),
                tool: descriptor.name.clone(),
                reason: format!("retry after restart failed: {error}"),
            }),
        }
    }

    async fn rediscover(&self, connection: &ServerConnection) {
        match connection.discover_tools(self.discovery_timeout).await {
            Ok(tools) => self.catalog.replace_server(connection.name(), tools),
            Err(e) => {
                warn!(server_name = %connection.name(), error = %e, "Rediscovery after restart failed");
                self.catalog.remove_server(connection.name());
            }
        }
    }

    async fn call(
        &self,
        connection: &ServerConnection,
        descriptor: &ToolDescriptor,
        arguments: &ToolArguments,
    ) -> Result<ToolResult, CallFailure> {
        let started = Instant::now();
        let outcome = connection
            .call_tool(&descriptor.name, arguments, self.call_timeout)
            .await;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match outcome {
            Ok(result) if result.is_error => Err(CallFailure::Tool(DispatchError::ToolExecution {
                server: descriptor.server_name.clone(),
                tool: descriptor.name.clone(),
                message: result.error_text(),
                code: None,
            })),
            Ok(result) => {
                debug!(
                    server_name = %descriptor.server_name,
                    tool = %descriptor.name,
                    duration_ms,
                    "Tool call succeeded"
                );
                Ok(ToolResult {
                    server: descriptor.server_name.clone(),
                    tool: descriptor.name.clone(),
                    arguments: arguments.clone(),
                    content: result.content,
                    structured: result.structured_content,
                    duration_ms,
                    fallback_from: None,
                })
            }
            Err(SessionError::Remote { code, message, .. }) => {
                Err(CallFailure::Tool(DispatchError::ToolExecution {
                    server: descriptor.server_name.clone(),
                    tool: descriptor.name.clone(),
                    message,
                    code: Some(code),
                }))
            }
            Err(error) => Err(CallFailure::Transport(error)),
        }
    }
}

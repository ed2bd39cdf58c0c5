//! A live connection to one tool server: its session, its process and its
//! discovered tools.

use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use toolhub_core::{ConnectionState, ServerDescriptor, ServerStatus, ToolArguments, ToolDescriptor};

use crate::error::SessionError;
use crate::process::ProcessHandle;
use crate::protocol::CallToolResult;
use crate::session::McpSession;

/// Running server instance.
pub struct ServerConnection {
    /// Configuration the connection was started from
    descriptor: ServerDescriptor,
    /// Protocol session over the child's stdio
    session: McpSession,
    /// Child process, absent for in-memory sessions
    process: Option<ProcessHandle>,
    started_at: DateTime<Utc>,
    restart_count: u32,
    /// Tools from the last successful discovery
    tools: RwLock<Arc<Vec<ToolDescriptor>>>,
}

impl fmt::Debug for ServerConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConnection")
            .field("name", &self.descriptor.name)
            .field("pid", &self.pid())
            .field("state", &self.state())
            .field("restart_count", &self.restart_count)
            .finish_non_exhaustive()
    }
}

impl ServerConnection {
    pub(crate) fn new(
        descriptor: ServerDescriptor,
        session: McpSession,
        process: Option<ProcessHandle>,
        restart_count: u32,
    ) -> Self {
        Self {
            descriptor,
            session,
            process,
            started_at: Utc::now(),
            restart_count,
            tools: RwLock::new(Arc::new(Vec::new())),
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub const fn descriptor(&self) -> &ServerDescriptor {
        &self.descriptor
    }

    pub const fn session(&self) -> &McpSession {
        &self.session
    }

    pub fn state(&self) -> ConnectionState {
        self.session.state()
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().and_then(ProcessHandle::pid)
    }

    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub const fn restart_count(&self) -> u32 {
        self.restart_count
    }

    /// Process still running and the session not `Dead`.
    pub fn is_alive(&self) -> bool {
        let process_running = self.process.as_ref().is_none_or(ProcessHandle::is_running);
        process_running && !self.state().is_dead()
    }

    /// Recent stderr output of the child.
    pub fn stderr_tail(&self) -> Vec<String> {
        self.process
            .as_ref()
            .map(ProcessHandle::stderr_tail)
            .unwrap_or_default()
    }

    /// Tools from the last successful discovery.
    pub fn tools(&self) -> Arc<Vec<ToolDescriptor>> {
        self.tools
            .read()
            .map(|tools| Arc::clone(&tools))
            .unwrap_or_default()
    }

    /// Ask the server for its tools and cache them.
    pub async fn discover_tools(
        &self,
        timeout: Duration,
    ) -> Result<Arc<Vec<ToolDescriptor>>, SessionError> {
        let schemas = self.session.list_tools(timeout).await?;
        let discovered: Vec<ToolDescriptor> = schemas
            .into_iter()
            .map(|schema| {
                let mut tool = ToolDescriptor::new(self.name(), schema.name);
                tool.description = schema.description;
                tool.input_schema = schema.input_schema;
                tool
            })
            .collect();

        debug!(
            server_name = %self.name(),
            tool_count = discovered.len(),
            "Discovered tools"
        );

        let discovered = Arc::new(discovered);
        if let Ok(mut slot) = self.tools.write() {
            *slot = Arc::clone(&discovered);
        }
        Ok(discovered)
    }

    pub async fn call_tool(
        &self,
        tool: &str,
        arguments: &ToolArguments,
        timeout: Duration,
    ) -> Result<CallToolResult, SessionError> {
        self.session.call_tool(tool, arguments, timeout).await
    }

    /// Snapshot for presentation.
    pub fn status(&self, last_error: Option<String>) -> ServerStatus {
        ServerStatus {
            name: self.descriptor.name.clone(),
            description: self.descriptor.description.clone(),
            state: self.state(),
            tool_count: self.tools().len(),
            pid: self.pid(),
            restart_count: self.restart_count,
            last_error,
        }
    }

    /// Mark the session dead and terminate the child. Idempotent.
    pub async fn stop(&self, grace: Duration) {
        self.session.mark_dead("stopped");
        if let Some(process) = &self.process {
            process.stop(grace).await;
        }
    }
}

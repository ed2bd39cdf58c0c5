//! Tool server process lifecycle: verify, spawn, handshake, stop, restart.
//!
//! Restarts are never automatic; the dispatcher asks for one through the
//! connection pool.

use std::process::Stdio;

use futures_util::stream::{self, StreamExt};
use tokio::process::Command;
use tracing::{debug, info, warn};

use toolhub_core::{OrchestratorSettings, ServerDescriptor};

use crate::connection::ServerConnection;
use crate::error::StartError;
use crate::launch::{build_effective_path, verify_launch_target};
use crate::process::ProcessHandle;
use crate::session::McpSession;

/// Starts and stops tool servers.
#[derive(Debug, Clone)]
pub struct Supervisor {
    settings: OrchestratorSettings,
}

impl Supervisor {
    pub const fn new(settings: OrchestratorSettings) -> Self {
        Self { settings }
    }

    pub const fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Start a server and bring it to `Ready`.
    ///
    /// The launch target is verified first; when it is missing nothing is
    /// spawned.
    pub async fn start(&self, descriptor: &ServerDescriptor) -> Result<ServerConnection, StartError> {
        self.launch(descriptor, 0).await
    }

    /// Start several servers, at most `startupConcurrency` at a time.
    ///
    /// Results are in descriptor order.
    pub async fn start_all(
        &self,
        descriptors: &[ServerDescriptor],
    ) -> Vec<Result<ServerConnection, StartError>> {
        let limit = self.settings.startup_concurrency().max(1);
        stream::iter(descriptors.iter().map(|descriptor| self.start(descriptor)))
            .buffered(limit)
            .collect()
            .await
    }

    pub fn is_alive(&self, connection: &ServerConnection) -> bool {
        connection.is_alive()
    }

    /// Terminate the server. Idempotent.
    pub async fn stop(&self, connection: &ServerConnection) {
        debug!(server_name = %connection.name(), pid = ?connection.pid(), "Stopping tool server");
        connection.stop(self.settings.shutdown_grace()).await;
    }

    /// Stop the server, then start it again from the same descriptor.
    pub async fn restart(
        &self,
        connection: &ServerConnection,
    ) -> Result<ServerConnection, StartError> {
        let restart_count = connection.restart_count().saturating_add(1);
        info!(
            server_name = %connection.name(),
            restart_count,
            "Restarting tool server"
        );
        self.stop(connection).await;
        self.launch(connection.descriptor(), restart_count).await
    }

    async fn launch(
        &self,
        descriptor: &ServerDescriptor,
        restart_count: u32,
    ) -> Result<ServerConnection, StartError> {
        let name = descriptor.name.as_str();

        let target = verify_launch_target(descriptor).map_err(|reason| {
            warn!(server_name = %name, reason = %reason, "Launch target missing, not spawning");
            StartError::LaunchTargetMissing {
                server: name.to_string(),
                reason,
            }
        })?;

        let mut command = Command::new(&target.program);
        command
            .args(&descriptor.args)
            .env("PATH", build_effective_path(&target.program))
            .envs(&descriptor.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &target.working_directory {
            command.current_dir(dir);
        }

        debug!(
            server_name = %name,
            program = %target.program.display(),
            args = ?descriptor.args,
            "Spawning tool server"
        );

        let mut child = command.spawn().map_err(|e| {
            warn!(server_name = %name, error = %e, "Failed to spawn tool server");
            StartError::Spawn {
                server: name.to_string(),
                reason: e.to_string(),
            }
        })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(StartError::Spawn {
                server: name.to_string(),
                reason: "stdio was not captured".to_string(),
            });
        };

        let session = McpSession::new(name, stdout, stdin);
        let process = ProcessHandle::monitor(name, child, session.state_handle());

        if let Err(e) = session
            .initialize(self.settings.client_name(), self.settings.handshake_timeout())
            .await
        {
            process.stop(self.settings.shutdown_grace()).await;
            let tail = process.stderr_tail();
            let reason = if tail.is_empty() {
                e.to_string()
            } else {
                format!("{e}; stderr: {}", tail.join(" | "))
            };
            warn!(server_name = %name, reason = %reason, "Handshake failed");
            return Err(StartError::HandshakeFailed {
                server: name.to_string(),
                reason,
            });
        }

        info!(
            server_name = %name,
            pid = ?process.pid(),
            restart_count,
            "Tool server ready"
        );
        Ok(ServerConnection::new(
            descriptor.clone(),
            session,
            Some(process),
            restart_count,
        ))
    }
}

//! Connections to every configured server, in configuration order.
//!
//! Each server has one slot. A restart replaces the slot's connection under a
//! per-server lock, so concurrent callers that saw the same failure trigger a
//! single restart and the rest reuse its result.

use std::sync::{Arc, RwLock};

use futures_util::future::join_all;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use toolhub_core::{ConnectionState, ServerDescriptor, ServerStatus};

use crate::connection::ServerConnection;
use crate::error::StartError;
use crate::supervisor::Supervisor;

/// Result of a restart request.
pub enum RestartOutcome {
    /// This caller restarted the server.
    Restarted(Arc<ServerConnection>),
    /// Another caller already replaced the connection.
    Reused(Arc<ServerConnection>),
}

impl RestartOutcome {
    pub fn connection(&self) -> &Arc<ServerConnection> {
        match self {
            Self::Restarted(connection) | Self::Reused(connection) => connection,
        }
    }
}

struct Slot {
    descriptor: ServerDescriptor,
    connection: RwLock<Option<Arc<ServerConnection>>>,
    /// Why the server is down, when it is
    last_error: RwLock<Option<StartError>>,
    restart_count: RwLock<u32>,
    restart_lock: Mutex<()>,
}

impl Slot {
    fn connection(&self) -> Option<Arc<ServerConnection>> {
        self.connection.read().ok().and_then(|slot| slot.clone())
    }

    fn set(&self, outcome: Result<Arc<ServerConnection>, StartError>) {
        let (connection, error) = match outcome {
            Ok(connection) => (Some(connection), None),
            Err(error) => (None, Some(error)),
        };
        if let Ok(mut slot) = self.connection.write() {
            *slot = connection;
        }
        if let Ok(mut slot) = self.last_error.write() {
            *slot = error;
        }
    }

    fn last_error(&self) -> Option<StartError> {
        self.last_error.read().ok().and_then(|e| e.clone())
    }

    fn restart_count(&self) -> u32 {
        self.restart_count.read().map(|c| *c).unwrap_or_default()
    }

    fn bump_restart_count(&self) -> u32 {
        self.restart_count
            .write()
            .map(|mut c| {
                *c = c.saturating_add(1);
                *c
            })
            .unwrap_or_default()
    }
}

/// All server connections of one orchestrator.
pub struct ConnectionPool {
    supervisor: Supervisor,
    slots: Vec<Slot>,
}

impl ConnectionPool {
    /// Start every descriptor and return the pool with the failures.
    ///
    /// A failed server keeps its slot so its status stays visible.
    pub async fn start(
        supervisor: Supervisor,
        descriptors: Vec<ServerDescriptor>,
    ) -> (Self, Vec<StartError>) {
        let results = supervisor.start_all(&descriptors).await;

        let mut failures = Vec::new();
        let slots = descriptors
            .into_iter()
            .zip(results)
            .map(|(descriptor, result)| {
                let slot = Slot {
                    descriptor,
                    connection: RwLock::new(None),
                    last_error: RwLock::new(None),
                    restart_count: RwLock::new(0),
                    restart_lock: Mutex::new(()),
                };
                match result {
                    Ok(connection) => slot.set(Ok(Arc::new(connection))),
                    Err(error) => {
                        failures.push(error.clone());
                        slot.set(Err(error));
                    }
                }
                slot
            })
            .collect();

        (Self { supervisor, slots }, failures)
    }

    pub const fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    fn slot(&self, name: &str) -> Option<&Slot> {
        self.slots.iter().find(|slot| slot.descriptor.name == name)
    }

    /// Configured server names in order.
    pub fn names(&self) -> Vec<String> {
        self.slots
            .iter()
            .map(|slot| slot.descriptor.name.clone())
            .collect()
    }

    /// Current connection of `name`, if it is up.
    pub fn get(&self, name: &str) -> Option<Arc<ServerConnection>> {
        self.slot(name).and_then(Slot::connection)
    }

    /// All current connections in configuration order.
    pub fn connections(&self) -> Vec<Arc<ServerConnection>> {
        self.slots.iter().filter_map(Slot::connection).collect()
    }

    /// Names of servers whose connection is `Ready` or `Degraded`.
    pub fn ready_names(&self) -> Vec<String> {
        self.connections()
            .iter()
            .filter(|connection| connection.state().is_callable())
            .map(|connection| connection.name().to_string())
            .collect()
    }

    /// Replace `stale` with a fresh connection.
    ///
    /// When the slot already holds a different live connection, it is
    /// returned as [`RestartOutcome::Reused`] without restarting again.
    pub async fn restart(
        &self,
        name: &str,
        stale: &Arc<ServerConnection>,
    ) -> Result<RestartOutcome, StartError> {
        let Some(slot) = self.slot(name) else {
            return Err(StartError::LaunchTargetMissing {
                server: name.to_string(),
                reason: "server is not configured".to_string(),
            });
        };

        let _guard = slot.restart_lock.lock().await;

        match slot.connection() {
            Some(current) if !Arc::ptr_eq(&current, stale) && current.is_alive() => {
                debug!(server_name = %name, "Connection already replaced, reusing");
                return Ok(RestartOutcome::Reused(current));
            }
            None => {
                if let Some(error) = slot.last_error() {
                    // A concurrent restart already failed; the server stays down.
                    return Err(error);
                }
            }
            Some(_) => {}
        }

        slot.bump_restart_count();
        match self.supervisor.restart(stale).await {
            Ok(fresh) => {
                let fresh = Arc::new(fresh);
                slot.set(Ok(Arc::clone(&fresh)));
                Ok(RestartOutcome::Restarted(fresh))
            }
            Err(error) => {
                warn!(server_name = %name, error = %error, "Restart failed, server stays down");
                slot.set(Err(error.clone()));
                Err(error)
            }
        }
    }

    /// Status of every configured server, in configuration order.
    pub fn statuses(&self) -> Vec<ServerStatus> {
        self.slots
            .iter()
            .map(|slot| {
                let last_error = slot.last_error().map(|e| e.to_string());
                match slot.connection() {
                    Some(connection) => connection.status(last_error),
                    None => ServerStatus {
                        name: slot.descriptor.name.clone(),
                        description: slot.descriptor.description.clone(),
                        state: if last_error.is_some() {
                            ConnectionState::Dead
                        } else {
                            ConnectionState::Disconnected
                        },
                        tool_count: 0,
                        pid: None,
                        restart_count: slot.restart_count(),
                        last_error,
                    },
                }
            })
            .collect()
    }

    /// Stop every server concurrently.
    pub async fn shutdown(&self) {
        let connections = self.connections();
        debug!(count = connections.len(), "Stopping tool servers");
        join_all(
            connections
                .iter()
                .map(|connection| self.supervisor.stop(connection)),
        )
        .await;
    }
}

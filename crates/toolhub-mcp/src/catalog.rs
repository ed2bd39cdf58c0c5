//! Cross-server tool catalog and name resolution.
//!
//! The catalog is an immutable snapshot behind an `RwLock<Arc<_>>`. Updates
//! build a new snapshot and swap it in; readers clone the `Arc` and never
//! hold the lock across an await.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use futures_util::future::join_all;
use tracing::{debug, warn};

use toolhub_core::ToolDescriptor;

use crate::connection::ServerConnection;
use crate::error::ResolveError;

/// Separators accepted between a server name and a tool name.
const QUALIFIERS: [char; 2] = ['.', '/'];

#[derive(Debug, Default)]
struct Snapshot {
    /// `(server, tools)` in configuration order
    servers: Vec<(String, Arc<Vec<ToolDescriptor>>)>,
}

impl Snapshot {
    fn tools_of(&self, server: &str) -> Option<&[ToolDescriptor]> {
        self.servers
            .iter()
            .find(|(name, _)| name == server)
            .map(|(_, tools)| tools.as_slice())
    }
}

/// Discovered tools of every ready server.
pub struct CatalogRegistry {
    /// Configured server names; fixes the order and the known qualifiers.
    order: Vec<String>,
    snapshot: RwLock<Arc<Snapshot>>,
}

impl CatalogRegistry {
    pub fn new(server_order: Vec<String>) -> Self {
        Self {
            order: server_order,
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
        }
    }

    fn current(&self) -> Arc<Snapshot> {
        self.snapshot
            .read()
            .map(|snapshot| Arc::clone(&snapshot))
            .unwrap_or_default()
    }

    fn position(&self, server: &str) -> usize {
        self.order
            .iter()
            .position(|name| name == server)
            .unwrap_or(usize::MAX)
    }

    fn update(&self, edit: impl FnOnce(&mut Vec<(String, Arc<Vec<ToolDescriptor>>)>)) {
        if let Ok(mut slot) = self.snapshot.write() {
            let mut servers = slot.servers.clone();
            edit(&mut servers);
            servers.sort_by_key(|(name, _)| self.position(name));
            *slot = Arc::new(Snapshot { servers });
        }
    }

    /// Rediscover tools on every `Ready` connection concurrently.
    ///
    /// Connections in any other state are skipped. A discovery failure drops
    /// that server from the catalog and is logged.
    pub async fn refresh(&self, connections: &[Arc<ServerConnection>], timeout: Duration) {
        let ready: Vec<_> = connections
            .iter()
            .filter(|connection| connection.state() == toolhub_core::ConnectionState::Ready)
            .collect();

        let discovered = join_all(ready.iter().map(|connection| async move {
            let result = connection.discover_tools(timeout).await;
            (connection.name().to_string(), result)
        }))
        .await;

        let mut servers = Vec::new();
        for (name, result) in discovered {
            match result {
                Ok(tools) => servers.push((name, tools)),
                Err(e) => {
                    warn!(server_name = %name, error = %e, "Tool discovery failed");
                }
            }
        }

        debug!(
            servers = servers.len(),
            tools = servers.iter().map(|(_, t)| t.len()).sum::<usize>(),
            "Catalog refreshed"
        );
        self.update(|current| *current = servers);
    }

    /// Set the tools of one server, keeping configuration order.
    pub fn replace_server(&self, server: &str, tools: Arc<Vec<ToolDescriptor>>) {
        self.update(|servers| {
            servers.retain(|(name, _)| name != server);
            servers.push((server.to_string(), tools));
        });
    }

    pub fn remove_server(&self, server: &str) {
        self.update(|servers| servers.retain(|(name, _)| name != server));
    }

    /// Every tool, in server order.
    pub fn snapshot(&self) -> Vec<ToolDescriptor> {
        self.current()
            .servers
            .iter()
            .flat_map(|(_, tools)| tools.iter().cloned())
            .collect()
    }

    /// Tools grouped by server, in server order.
    pub fn grouped(&self) -> Vec<(String, Vec<ToolDescriptor>)> {
        self.current()
            .servers
            .iter()
            .map(|(name, tools)| (name.clone(), tools.to_vec()))
            .collect()
    }

    pub fn contains_server(&self, server: &str) -> bool {
        self.current().tools_of(server).is_some()
    }

    /// Resolve a tool name to the descriptor of the server that owns it.
    ///
    /// `explicit_server` wins. Otherwise a `server.tool` or `server/tool`
    /// name whose prefix is a configured server resolves directly, falling
    /// back to the whole name when that server has no such tool. A bare
    /// name must have exactly one owner.
    pub fn resolve(
        &self,
        name: &str,
        explicit_server: Option<&str>,
    ) -> Result<ToolDescriptor, ResolveError> {
        let snapshot = self.current();

        if let Some(server) = explicit_server {
            return lookup(&snapshot, server, name);
        }

        for qualifier in QUALIFIERS {
            if let Some((server, tool)) = name.split_once(qualifier) {
                if self.order.iter().any(|known| known == server) {
                    // Tool names may contain the qualifier themselves
                    return lookup(&snapshot, server, tool).or_else(|qualified| {
                        match resolve_bare(&snapshot, name) {
                            Err(ResolveError::NotFound { .. }) => Err(qualified),
                            bare => bare,
                        }
                    });
                }
            }
        }

        resolve_bare(&snapshot, name)
    }
}

/// A bare name must have exactly one owner.
fn resolve_bare(snapshot: &Snapshot, name: &str) -> Result<ToolDescriptor, ResolveError> {
    let mut owners = snapshot
        .servers
        .iter()
        .filter_map(|(_, tools)| tools.iter().find(|tool| tool.name == name));

    match (owners.next(), owners.next()) {
        (Some(only), None) => Ok(only.clone()),
        (Some(_), Some(_)) => Err(ResolveError::Ambiguous {
            tool: name.to_string(),
            candidates: snapshot
                .servers
                .iter()
                .filter(|(_, tools)| tools.iter().any(|tool| tool.name == name))
                .map(|(server, _)| server.clone())
                .collect(),
        }),
        (None, _) => Err(ResolveError::NotFound {
            tool: name.to_string(),
            server: None,
        }),
    }
}

fn lookup(snapshot: &Snapshot, server: &str, tool: &str) -> Result<ToolDescriptor, ResolveError> {
    snapshot
        .tools_of(server)
        .and_then(|tools| tools.iter().find(|t| t.name == tool))
        .cloned()
        .ok_or_else(|| ResolveError::NotFound {
            tool: tool.to_string(),
            server: Some(server.to_string()),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{scripted_session, text_result};
    use serde_json::{Value, json};
    use toolhub_core::ServerDescriptor;

    fn tools(server: &str, names: &[&str]) -> Arc<Vec<ToolDescriptor>> {
        Arc::new(
            names
                .iter()
                .map(|name| ToolDescriptor::new(server, *name))
                .collect(),
        )
    }

    fn registry() -> CatalogRegistry {
        let catalog = CatalogRegistry::new(vec!["git".into(), "svn".into(), "beauty".into()]);
        catalog.replace_server("beauty", tools("beauty", &["create_profile", "quick_palette"]));
        catalog.replace_server("git", tools("git", &["status", "log"]));
        catalog.replace_server("svn", tools("svn", &["status"]));
        catalog
    }

    #[test]
    fn unique_name_resolves_to_its_owner() {
        let tool = registry().resolve("log", None).unwrap();
        assert_eq!(tool.server_name, "git");
    }

    #[test]
    fn shared_name_is_ambiguous() {
        let err = registry().resolve("status", None).unwrap_err();
        assert_eq!(
            err,
            ResolveError::Ambiguous {
                tool: "status".to_string(),
                candidates: vec!["git".to_string(), "svn".to_string()],
            }
        );
    }

    #[test]
    fn explicit_server_and_qualified_names_disambiguate() {
        let catalog = registry();
        assert_eq!(catalog.resolve("status", Some("svn")).unwrap().server_name, "svn");
        assert_eq!(catalog.resolve("git.status", None).unwrap().server_name, "git");
        assert_eq!(catalog.resolve("svn/status", None).unwrap().server_name, "svn");
    }

    #[test]
    fn unknown_names_are_not_found() {
        let catalog = registry();
        assert_eq!(
            catalog.resolve("deploy", None).unwrap_err(),
            ResolveError::NotFound {
                tool: "deploy".to_string(),
                server: None
            }
        );
        assert_eq!(
            catalog.resolve("git.deploy", None).unwrap_err(),
            ResolveError::NotFound {
                tool: "deploy".to_string(),
                server: Some("git".to_string())
            }
        );
        // Unknown prefix falls back to a bare lookup of the whole name
        assert!(matches!(
            catalog.resolve("hg.status", None),
            Err(ResolveError::NotFound { server: None, .. })
        ));
    }

    #[test]
    fn tool_names_containing_a_qualifier_resolve_bare() {
        let catalog = CatalogRegistry::new(vec!["fs".into(), "git".into()]);
        catalog.replace_server("fs", tools("fs", &["fs/read", "list"]));
        catalog.replace_server("git", tools("git", &["status"]));

        let tool = catalog.resolve("fs/read", None).unwrap();
        assert_eq!(tool.server_name, "fs");
        assert_eq!(tool.name, "fs/read");

        // Qualified forms still work
        assert_eq!(catalog.resolve("fs.fs/read", None).unwrap().name, "fs/read");
        assert_eq!(catalog.resolve("fs/list", None).unwrap().name, "list");
    }

    #[test]
    fn snapshot_follows_configuration_order() {
        let names: Vec<_> = registry()
            .snapshot()
            .iter()
            .map(ToolDescriptor::qualified_name)
            .collect();
        assert_eq!(
            names,
            vec![
                "git.status",
                "git.log",
                "svn.status",
                "beauty.create_profile",
                "beauty.quick_palette"
            ]
        );
    }

    #[test]
    fn remove_server_drops_its_tools() {
        let catalog = registry();
        catalog.remove_server("svn");
        assert_eq!(catalog.resolve("status", None).unwrap().server_name, "git");
        assert!(!catalog.contains_server("svn"));
        assert_eq!(catalog.grouped().len(), 2);
    }

    fn noop(_tool: &str, _args: &Value) -> Value {
        text_result("")
    }

    #[tokio::test]
    async fn refresh_skips_connections_that_are_not_ready() {
        let ready = scripted_session("alpha", vec![json!({"name": "ping"})], noop).await;
        let dead = scripted_session("beta", vec![json!({"name": "pong"})], noop).await;
        dead.mark_dead("test");

        let connections = vec![
            Arc::new(ServerConnection::new(
                ServerDescriptor::new("alpha", "alpha"),
                ready,
                None,
                0,
            )),
            Arc::new(ServerConnection::new(
                ServerDescriptor::new("beta", "beta"),
                dead,
                None,
                0,
            )),
        ];

        let catalog = CatalogRegistry::new(vec!["alpha".into(), "beta".into()]);
        catalog.refresh(&connections, Duration::from_secs(5)).await;

        let grouped = catalog.grouped();
        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped[0].0, "alpha");
        assert_eq!(grouped[0].1[0].name, "ping");
    }
}

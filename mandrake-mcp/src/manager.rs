//! Pool of server handles keyed by server id.
//!
//! Owns no subprocess directly; every lifecycle operation delegates to the
//! matching [`ServerHandle`]. Structural mutation of the map (insert/remove)
//! is behind a single mutex; concurrent `start_server` calls for the same id
//! are deduplicated by checking for an existing entry before spawning.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};

use mandrake_core::HealthSample;

use crate::error::McpError;
use crate::handle::{ServerConfig, ServerHandle, ServerState};
use crate::types::CatalogedTool;

/// Keyed pool of MCP server handles for one workspace.
pub struct Manager {
    servers: RwLock<HashMap<String, Arc<ServerHandle>>>,
    starting: Mutex<HashMap<String, Arc<tokio::sync::Notify>>>,
}

impl Manager {
    /// An empty manager with no registered servers.
    pub fn new() -> Self {
        Self {
            servers: RwLock::new(HashMap::new()),
            starting: Mutex::new(HashMap::new()),
        }
    }

    /// Register and start a server under `id`. Concurrent calls for the same
    /// `id` share a single in-flight start: the first caller drives the
    /// spawn, later callers wait on it and observe the same outcome.
    pub async fn start_server(&self, id: &str, config: ServerConfig) -> Result<(), McpError> {
        let existing = self.servers.read().await.get(id).cloned();
        if let Some(handle) = existing {
            return self.await_or_start(handle).await;
        }

        let notify = {
            let mut starting = self.starting.lock().await;
            if let Some(notify) = starting.get(id) {
                let notify = notify.clone();
                drop(starting);
                notify.notified().await;
                let handle = self
                    .servers
                    .read()
                    .await
                    .get(id)
                    .cloned()
                    .ok_or_else(|| McpError::ServerNotFound(id.to_string()))?;
                return match handle.state() {
                    ServerState::Ready | ServerState::Disabled => Ok(()),
                    _ => Err(McpError::ServerNotFound(id.to_string())),
                };
            }
            let notify = Arc::new(tokio::sync::Notify::new());
            starting.insert(id.to_string(), notify.clone());
            notify
        };

        let handle = ServerHandle::new(id, config);
        self.servers
            .write()
            .await
            .insert(id.to_string(), handle.clone());

        let result = handle.start().await;

        self.starting.lock().await.remove(id);
        notify.notify_waiters();

        result
    }

    async fn await_or_start(&self, handle: Arc<ServerHandle>) -> Result<(), McpError> {
        match handle.state() {
            ServerState::Ready | ServerState::Disabled => Ok(()),
            _ => handle.start().await,
        }
    }

    /// Stop and remove the server. A no-op if no server is registered under
    /// `id`.
    pub async fn stop_server(&self, id: &str) {
        let handle = self.servers.write().await.remove(id);
        if let Some(handle) = handle {
            handle.stop().await;
        }
    }

    /// Stop then start the same server on its existing configuration,
    /// preserving its tool catalog through the restart (the handle keeps
    /// its last-known catalog until `refresh_tools` succeeds again).
    pub async fn restart_server(&self, id: &str) -> Result<(), McpError> {
        let handle = self
            .servers
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| McpError::ServerNotFound(id.to_string()))?;
        handle.stop().await;
        handle.start().await
    }

    /// The tool catalog of every ready server, each entry tagged with its
    /// server id.
    pub async fn list_all_tools(&self) -> Vec<CatalogedTool> {
        let servers: Vec<Arc<ServerHandle>> = self.servers.read().await.values().cloned().collect();
        let mut tools = Vec::new();
        for server in servers {
            tools.extend(server.cataloged_tools().await);
        }
        tools
    }

    /// Invoke `tool` on `server_id`. Fails [`McpError::ServerNotFound`] if no
    /// handle is registered under that id.
    pub async fn invoke_tool(
        &self,
        server_id: &str,
        tool: &str,
        args: serde_json::Value,
        approved: bool,
    ) -> Result<crate::types::ToolResult, McpError> {
        let handle = self
            .servers
            .read()
            .await
            .get(server_id)
            .cloned()
            .ok_or_else(|| McpError::ServerNotFound(server_id.to_string()))?;
        handle.invoke_tool(tool, args, approved).await
    }

    /// The most recent health window for a server, or `None` if unknown.
    pub async fn get_server_health(&self, server_id: &str) -> Option<Vec<HealthSample>> {
        let handle = self.servers.read().await.get(server_id).cloned()?;
        Some(handle.health_window().await)
    }

    /// The lifecycle state of a server, or `None` if unknown.
    pub async fn server_state(&self, server_id: &str) -> Option<ServerState> {
        self.servers
            .read()
            .await
            .get(server_id)
            .map(|h| h.state())
    }

    /// All registered server ids.
    pub async fn server_ids(&self) -> Vec<String> {
        self.servers.read().await.keys().cloned().collect()
    }

    /// Run one health-check round against every registered server,
    /// scheduling a reconnect with backoff for any that fail past their
    /// configured retry threshold.
    pub async fn poll_health(&self) {
        let servers: Vec<Arc<ServerHandle>> = self.servers.read().await.values().cloned().collect();
        for server in servers {
            if server.state() == ServerState::Disabled {
                continue;
            }
            let sample = server.check_health().await;
            if !sample.success && server.state() == ServerState::Error {
                let delay = server.backoff_delay().await;
                let jittered = apply_jitter(delay);
                let server = server.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(jittered).await;
                    let _ = server.start().await;
                });
            }
        }
    }

    /// Stop every registered server. Used during registry/workspace
    /// teardown.
    pub async fn shutdown(&self) {
        let handles: Vec<Arc<ServerHandle>> = {
            let mut servers = self.servers.write().await;
            servers.drain().map(|(_, h)| h).collect()
        };
        for handle in handles {
            handle.stop().await;
        }
    }
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply a deterministic ±20% jitter to a backoff delay. Uses the delay's
/// own sub-millisecond component as the source of variance so this crate
/// does not need to depend on a random-number generator.
fn apply_jitter(delay: Duration) -> Duration {
    let base = delay.as_millis() as u64;
    if base == 0 {
        return delay;
    }
    let variance = (base as f64 * 0.2) as u64;
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0) as u64;
    let offset = if variance == 0 { 0 } else { nanos % (2 * variance) } as i64 - variance as i64;
    let adjusted = (base as i64 + offset).max(0) as u64;
    Duration::from_millis(adjusted)
}

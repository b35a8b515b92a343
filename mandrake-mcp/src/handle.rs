//! A single MCP server's subprocess, tool catalog, and health state.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};

use mandrake_core::{DurationMs, HealthSample};

use crate::error::{McpError, TransportError};
use crate::transport::{Transport, TransportConfig};
use crate::types::{CatalogedTool, ToolResult, ToolSpec};

/// `protocolVersion` sent in the `initialize` handshake (spec §6).
const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// Strategy used by [`ServerHandle::check_health`].
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum HealthCheckStrategy {
    /// Re-list tools; success means the server answered.
    ToolListing,
    /// Send a bare `ping` request.
    Ping,
    /// Invoke a fixed tool with fixed args.
    SpecificTool {
        /// The tool to invoke.
        tool: String,
        /// The fixed arguments to pass.
        args: Value,
    },
    /// No built-in strategy; health is reported externally.
    Custom,
}

impl Default for HealthCheckStrategy {
    fn default() -> Self {
        HealthCheckStrategy::ToolListing
    }
}

/// Per-server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// The executable to run.
    pub command: String,
    /// Arguments passed to the executable.
    #[serde(default)]
    pub args: Vec<String>,
    /// Additional environment variables set on the child.
    #[serde(default)]
    pub env: std::collections::HashMap<String, String>,
    /// Tool names that may be invoked without interactive approval.
    #[serde(default)]
    pub auto_approve: Vec<String>,
    /// If true, the server never starts and every invocation fails
    /// `ServerDisabled`.
    #[serde(default)]
    pub disabled: bool,
    /// Health-check configuration.
    #[serde(default)]
    pub health_check: HealthCheckConfig,
    /// Per-tool invocation timeout. Defaults to 30s.
    #[serde(default = "default_tool_timeout_ms")]
    pub tool_timeout_ms: u64,
}

fn default_tool_timeout_ms() -> u64 {
    30_000
}

/// Health-check cadence and strategy.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthCheckConfig {
    /// The strategy used for each poll.
    #[serde(default)]
    pub strategy: HealthCheckStrategy,
    /// Interval between polls.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Per-poll timeout.
    #[serde(default = "default_check_timeout_ms")]
    pub timeout_ms: u64,
    /// Consecutive failures tolerated before transitioning to `error`.
    #[serde(default = "default_retries")]
    pub retries: u32,
}

fn default_interval_ms() -> u64 {
    30_000
}
fn default_check_timeout_ms() -> u64 {
    5_000
}
fn default_retries() -> u32 {
    3
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            strategy: HealthCheckStrategy::default(),
            interval_ms: default_interval_ms(),
            timeout_ms: default_check_timeout_ms(),
            retries: default_retries(),
        }
    }
}

const STATE_DISCONNECTED: u8 = 0;
const STATE_STARTING: u8 = 1;
const STATE_READY: u8 = 2;
const STATE_STOPPING: u8 = 3;
const STATE_DISABLED: u8 = 4;
const STATE_ERROR: u8 = 5;

/// The lifecycle state of a [`ServerHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerState {
    /// No subprocess running, no error on record.
    Disconnected,
    /// A start is in progress.
    Starting,
    /// Connected and healthy.
    Ready,
    /// A stop is in progress.
    Stopping,
    /// Administratively disabled; never started.
    Disabled,
    /// Backing off after repeated health-check failures.
    Error,
}

impl From<u8> for ServerState {
    fn from(v: u8) -> Self {
        match v {
            STATE_STARTING => ServerState::Starting,
            STATE_READY => ServerState::Ready,
            STATE_STOPPING => ServerState::Stopping,
            STATE_DISABLED => ServerState::Disabled,
            STATE_ERROR => ServerState::Error,
            _ => ServerState::Disconnected,
        }
    }
}

impl From<ServerState> for u8 {
    fn from(s: ServerState) -> Self {
        match s {
            ServerState::Disconnected => STATE_DISCONNECTED,
            ServerState::Starting => STATE_STARTING,
            ServerState::Ready => STATE_READY,
            ServerState::Stopping => STATE_STOPPING,
            ServerState::Disabled => STATE_DISABLED,
            ServerState::Error => STATE_ERROR,
        }
    }
}

const HEALTH_WINDOW: usize = 20;
const BACKOFF_BASE_MS: u64 = 500;
const BACKOFF_CAP_MS: u64 = 30_000;

/// Tracks consecutive-failure backoff scheduling per spec (base 500ms, cap
/// 30s, jitter computed by the caller since it needs a source of
/// randomness this crate does not depend on).
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    consecutive_failures: u32,
}

impl Backoff {
    /// A fresh backoff tracker with no recorded failures.
    pub fn new() -> Self {
        Self {
            consecutive_failures: 0,
        }
    }

    /// Record a success, resetting the failure streak.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Record a failure, returning the updated consecutive-failure count.
    pub fn record_failure(&mut self) -> u32 {
        self.consecutive_failures += 1;
        self.consecutive_failures
    }

    /// The base delay before the next reconnect attempt, doubling per
    /// failure and capped at 30s. Callers should apply their own ±20%
    /// jitter.
    pub fn delay(&self) -> Duration {
        let shift = self.consecutive_failures.saturating_sub(1).min(6);
        let ms = BACKOFF_BASE_MS.saturating_mul(1u64 << shift).min(BACKOFF_CAP_MS);
        Duration::from_millis(ms)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

/// A running or not-yet-started MCP server: one subprocess, one transport,
/// its tool catalog, and health bookkeeping.
pub struct ServerHandle {
    id: String,
    config: ServerConfig,
    transport: Transport,
    state: AtomicU8,
    tools: RwLock<Vec<ToolSpec>>,
    health: Mutex<VecDeque<HealthSample>>,
    backoff: Mutex<Backoff>,
}

impl ServerHandle {
    /// Build a handle for `config`, not yet started. If `config.disabled`,
    /// the handle starts in the terminal `disabled` state.
    pub fn new(id: impl Into<String>, config: ServerConfig) -> Arc<Self> {
        let id = id.into();
        let disabled = config.disabled;
        let transport_config = TransportConfig {
            command: config.command.clone(),
            args: config.args.clone(),
            env: config.env.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        };
        Arc::new(Self {
            id,
            config,
            transport: Transport::new(transport_config),
            state: AtomicU8::new(if disabled { STATE_DISABLED } else { STATE_DISCONNECTED }),
            tools: RwLock::new(Vec::new()),
            health: Mutex::new(VecDeque::with_capacity(HEALTH_WINDOW)),
            backoff: Mutex::new(Backoff::new()),
        })
    }

    /// This handle's server id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ServerState {
        self.state.load(Ordering::SeqCst).into()
    }

    fn set_state(&self, state: ServerState) {
        self.state.store(state.into(), Ordering::SeqCst);
    }

    /// Start the subprocess, perform the `initialize` handshake, and fetch
    /// its initial tool catalog.
    pub async fn start(&self) -> Result<(), McpError> {
        if self.state() == ServerState::Disabled {
            return Err(McpError::ServerDisabled(self.id.clone()));
        }
        self.set_state(ServerState::Starting);
        if let Err(err) = self.transport.start().await {
            self.set_state(ServerState::Error);
            return Err(err.into());
        }
        if let Err(err) = self.initialize().await {
            self.set_state(ServerState::Error);
            return Err(err);
        }
        match self.refresh_tools().await {
            Ok(()) => {
                self.set_state(ServerState::Ready);
                Ok(())
            }
            Err(err) => {
                self.set_state(ServerState::Error);
                Err(err)
            }
        }
    }

    /// Send the `initialize` request and wait for the server's reply before
    /// any other method is dispatched (spec §4.2/§6). A transport failure
    /// here means the subprocess died or closed its pipes before completing
    /// the handshake, which is reported as `ConnectionError` rather than the
    /// transport's generic `ConnectionClosed`.
    async fn initialize(&self) -> Result<(), McpError> {
        let params = serde_json::json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": { "name": "mandrake", "version": env!("CARGO_PKG_VERSION") },
        });
        let response = self
            .transport
            .send("initialize", Some(params))
            .await
            .map_err(|err| {
                McpError::Transport(TransportError::ConnectionError(format!(
                    "subprocess exited before the initialize handshake completed: {err}"
                )))
            })?;
        if let Some(err) = response.error {
            return Err(McpError::Protocol(crate::transport::describe_rpc_error(&err)));
        }
        Ok(())
    }

    /// Stop the subprocess. Idempotent.
    pub async fn stop(&self) {
        self.set_state(ServerState::Stopping);
        self.transport.close().await;
        self.set_state(ServerState::Disconnected);
    }

    async fn refresh_tools(&self) -> Result<(), McpError> {
        let response = self.transport.send("tools/list", None).await?;
        if let Some(err) = response.error {
            return Err(McpError::Protocol(crate::transport::describe_rpc_error(&err)));
        }
        let tools: Vec<ToolSpec> = response
            .result
            .and_then(|v| v.get("tools").cloned())
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| McpError::Protocol(e.to_string()))?
            .unwrap_or_default();
        *self.tools.write().await = tools;
        Ok(())
    }

    /// The currently cached tool catalog.
    pub async fn list_tools(&self) -> Vec<ToolSpec> {
        self.tools.read().await.clone()
    }

    /// The catalog tagged with this server's id.
    pub async fn cataloged_tools(&self) -> Vec<CatalogedTool> {
        self.tools
            .read()
            .await
            .iter()
            .cloned()
            .map(|spec| CatalogedTool {
                server: self.id.clone(),
                spec,
            })
            .collect()
    }

    /// Invoke `tool` with `args`. `approved` reflects the caller's
    /// resolution of any interactive approval hook; tools in
    /// `config.auto_approve` bypass it automatically regardless of this
    /// flag.
    pub async fn invoke_tool(
        &self,
        tool: &str,
        args: Value,
        approved: bool,
    ) -> Result<ToolResult, McpError> {
        if self.state() == ServerState::Disabled {
            return Err(McpError::ServerDisabled(self.id.clone()));
        }

        let auto_approved: HashSet<&str> =
            self.config.auto_approve.iter().map(String::as_str).collect();
        if !auto_approved.contains(tool) && !approved {
            return Err(McpError::ToolDenied {
                server: self.id.clone(),
                tool: tool.to_string(),
            });
        }

        let timeout = Duration::from_millis(self.config.tool_timeout_ms);
        let params = serde_json::json!({ "name": tool, "arguments": args });
        let started = std::time::Instant::now();

        let result = tokio::time::timeout(timeout, self.transport.send("tools/call", Some(params)))
            .await
            .map_err(|_| McpError::ToolTimeout {
                server: self.id.clone(),
                tool: tool.to_string(),
                elapsed_ms: started.elapsed().as_millis() as u64,
            })?;

        let response = result?;
        if let Some(err) = response.error {
            return Err(McpError::Protocol(crate::transport::describe_rpc_error(&err)));
        }
        let value = response.result.unwrap_or(Value::Null);
        serde_json::from_value(value).map_err(|e| McpError::Protocol(e.to_string()))
    }

    /// Request completion suggestions for a prompt or resource argument
    /// (`completion/complete`, spec §4.3/§6). `params` is passed through
    /// verbatim as the request envelope; the result is returned unmodified,
    /// same as [`ServerHandle::invoke_tool`] — this crate never interprets
    /// completion payloads.
    pub async fn get_completions(&self, params: Value) -> Result<Value, McpError> {
        if self.state() == ServerState::Disabled {
            return Err(McpError::ServerDisabled(self.id.clone()));
        }
        let response = self.transport.send("completion/complete", Some(params)).await?;
        if let Some(err) = response.error {
            return Err(McpError::Protocol(crate::transport::describe_rpc_error(&err)));
        }
        Ok(response.result.unwrap_or(Value::Null))
    }

    /// Run one health check per the configured strategy, recording the
    /// sample and updating the backoff tracker. Three consecutive failures
    /// transitions the handle to `error`.
    pub async fn check_health(&self) -> HealthSample {
        let started = std::time::Instant::now();
        let timeout = Duration::from_millis(self.config.health_check.timeout_ms);

        let outcome = tokio::time::timeout(timeout, self.run_health_probe()).await;
        let latency = DurationMs::from_millis(started.elapsed().as_millis() as u64);

        let sample = match outcome {
            Ok(Ok(())) => HealthSample {
                timestamp: chrono::Utc::now(),
                success: true,
                latency,
                error: None,
            },
            Ok(Err(err)) => HealthSample {
                timestamp: chrono::Utc::now(),
                success: false,
                latency,
                error: Some(err.to_string()),
            },
            Err(_) => HealthSample {
                timestamp: chrono::Utc::now(),
                success: false,
                latency,
                error: Some("health check timed out".into()),
            },
        };

        let mut backoff = self.backoff.lock().await;
        if sample.success {
            backoff.record_success();
        } else {
            let failures = backoff.record_failure();
            if failures >= self.config.health_check.retries {
                self.set_state(ServerState::Error);
            }
        }
        drop(backoff);

        let mut window = self.health.lock().await;
        if window.len() == HEALTH_WINDOW {
            window.pop_front();
        }
        window.push_back(sample.clone());

        sample
    }

    async fn run_health_probe(&self) -> Result<(), McpError> {
        match &self.config.health_check.strategy {
            HealthCheckStrategy::ToolListing => self.refresh_tools().await,
            HealthCheckStrategy::Ping => {
                self.transport.send("ping", None).await?;
                Ok(())
            }
            HealthCheckStrategy::SpecificTool { tool, args } => {
                self.invoke_tool(tool, args.clone(), true).await.map(|_| ())
            }
            HealthCheckStrategy::Custom => Ok(()),
        }
    }

    /// The delay to wait before the next reconnect attempt, per the
    /// current backoff state.
    pub async fn backoff_delay(&self) -> Duration {
        self.backoff.lock().await.delay()
    }

    /// A snapshot of the rolling health-check window, most recent last.
    pub async fn health_window(&self) -> Vec<HealthSample> {
        self.health.lock().await.iter().cloned().collect()
    }

    /// This handle's static configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

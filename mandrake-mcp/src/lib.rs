//! # mandrake-mcp — Model Context Protocol subprocess manager
//!
//! Owns tool-server lifecycles end to end: a framed JSON-RPC 2.0
//! [`transport`] over a subprocess's stdio, a [`handle::ServerHandle`] that
//! layers lifecycle/health/catalog bookkeeping on top of one transport, and
//! a [`manager::Manager`] that pools handles keyed by server id with
//! restart and health-poll support.
//!
//! Grounded on this workspace's own wire format (not an external MCP SDK):
//! newline-delimited JSON-RPC over `tokio::process::Child` stdio, matching
//! the framed-transport pattern used throughout the pack for subprocess
//! protocols.

#![deny(missing_docs)]

mod error;
mod handle;
mod manager;
mod transport;
mod types;

pub use error::{McpError, TransportError};
pub use handle::{
    Backoff, HealthCheckConfig, HealthCheckStrategy, ServerConfig, ServerHandle, ServerState,
};
pub use manager::Manager;
pub use transport::{Transport, TransportConfig, TransportState};
pub use types::{
    CatalogedTool, JsonRpcErrorPayload, JsonRpcInbound, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, ToolResult, ToolSpec,
};

//! Error types for MCP transport, server-handle, and manager operations.

use mandrake_core::{ErrorKind, MandrakeError};
use thiserror::Error;

/// Errors from the framed JSON-RPC transport.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum TransportError {
    /// The subprocess exited before the `initialize` handshake completed.
    #[error("connection failed: {0}")]
    ConnectionError(String),

    /// `send` was called while the transport was not `connected`.
    #[error("transport is closed")]
    ConnectionClosed,

    /// The outbound message did not validate against the JSON-RPC shape.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Underlying process I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Errors from a server handle or the manager.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum McpError {
    /// Transport-level failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server is administratively disabled.
    #[error("server disabled: {0}")]
    ServerDisabled(String),

    /// No server is registered under this id.
    #[error("server not found: {0}")]
    ServerNotFound(String),

    /// The approval hook rejected this tool invocation.
    #[error("tool denied: {tool} on {server}")]
    ToolDenied {
        /// The server the tool belongs to.
        server: String,
        /// The denied tool's name.
        tool: String,
    },

    /// A tool invocation exceeded its timeout.
    #[error("tool timeout: {tool} on {server} after {elapsed_ms}ms")]
    ToolTimeout {
        /// The server the tool belongs to.
        server: String,
        /// The timed-out tool's name.
        tool: String,
        /// How long the call ran before timing out.
        elapsed_ms: u64,
    },

    /// The remote server reported the call as an error; the result is
    /// still captured as a `ToolResult{isError:true}` by the caller, this
    /// variant exists for transport-level reporting of protocol faults.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl From<McpError> for MandrakeError {
    fn from(err: McpError) -> Self {
        let kind = match &err {
            McpError::ServerDisabled(_) => ErrorKind::ServerDisabled,
            McpError::ServerNotFound(_) => ErrorKind::ServerNotFound,
            McpError::ToolDenied { .. } => ErrorKind::ToolDenied,
            McpError::ToolTimeout { .. } => ErrorKind::ToolTimeout,
            _ => ErrorKind::Internal,
        };
        MandrakeError::new(kind, err.to_string()).with_cause(err)
    }
}

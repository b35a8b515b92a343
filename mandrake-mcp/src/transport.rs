//! Framed JSON-RPC 2.0 transport over a subprocess's stdio.
//!
//! Grounded on `neuron-mcp`'s stdio client (`McpClient::connect_stdio`,
//! which spawns a `rmcp::transport::child_process::TokioChildProcess` and
//! drives it through `rmcp::ServiceExt::serve`): one child process, one
//! request/response cycle at a time, newline-delimited JSON, correlation by
//! JSON-RPC `id`. `rmcp` owns that framing and handshake internally; this
//! crate hand-rolls the equivalent because nothing in the teacher's stack
//! exposes the wire-level request/response loop this spec's explicit state
//! machine needs. What's added here is that explicit state machine:
//! `closed -> starting -> connected -> closing -> closed`, with `send`
//! rejected outside `connected`.

use std::process::Stdio;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::Mutex;

use crate::error::TransportError;
use crate::types::{JsonRpcErrorPayload, JsonRpcRequest, JsonRpcResponse};

/// Configuration needed to spawn a server's subprocess.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// The executable to run.
    pub command: String,
    /// Arguments passed to the executable.
    pub args: Vec<String>,
    /// Additional environment variables set on the child.
    pub env: Vec<(String, String)>,
}

/// Lines read without a leading `{` are tolerated up to this count before
/// the transport declares the server broken (e.g. a server that logs to
/// stdout instead of stderr).
const MAX_SKIP_LINES: usize = 1000;

const STATE_CLOSED: u8 = 0;
const STATE_STARTING: u8 = 1;
const STATE_CONNECTED: u8 = 2;
const STATE_CLOSING: u8 = 3;

/// The lifecycle state of a [`Transport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// No subprocess is running.
    Closed,
    /// The subprocess is starting; stdio pipes are not yet usable.
    Starting,
    /// The subprocess is live and accepting requests.
    Connected,
    /// A close is in progress.
    Closing,
}

impl From<u8> for TransportState {
    fn from(v: u8) -> Self {
        match v {
            STATE_STARTING => TransportState::Starting,
            STATE_CONNECTED => TransportState::Connected,
            STATE_CLOSING => TransportState::Closing,
            _ => TransportState::Closed,
        }
    }
}

/// A framed, bidirectional JSON-RPC channel to one MCP server subprocess.
pub struct Transport {
    config: TransportConfig,
    state: AtomicU8,
    next_id: AtomicU64,
    child: Mutex<Option<Child>>,
    stdin: Mutex<Option<ChildStdin>>,
    stdout: Mutex<Option<BufReader<ChildStdout>>>,
    request_lock: Mutex<()>,
}

impl Transport {
    /// Build a transport for `config`, in the `closed` state. Nothing is
    /// spawned until [`Transport::start`] is called.
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            state: AtomicU8::new(STATE_CLOSED),
            next_id: AtomicU64::new(1),
            child: Mutex::new(None),
            stdin: Mutex::new(None),
            stdout: Mutex::new(None),
            request_lock: Mutex::new(()),
        }
    }

    /// The current lifecycle state.
    pub fn state(&self) -> TransportState {
        self.state.load(Ordering::SeqCst).into()
    }

    /// Exact with respect to the internal state machine.
    pub fn is_connected(&self) -> bool {
        self.state() == TransportState::Connected
    }

    /// Spawn the subprocess and capture its stdio. Transitions
    /// `closed -> starting -> connected`, or back to `closed` on failure.
    pub async fn start(&self) -> Result<(), TransportError> {
        self.state.store(STATE_STARTING, Ordering::SeqCst);

        let mut cmd = tokio::process::Command::new(&self.config.command);
        cmd.args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (key, value) in &self.config.env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|e| {
            self.state.store(STATE_CLOSED, Ordering::SeqCst);
            TransportError::ConnectionError(format!("failed to spawn: {e}"))
        })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            self.state.store(STATE_CLOSED, Ordering::SeqCst);
            TransportError::ConnectionError("child stdin not captured".into())
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            self.state.store(STATE_CLOSED, Ordering::SeqCst);
            TransportError::ConnectionError("child stdout not captured".into())
        })?;

        // If the process has already exited, the handshake cannot succeed.
        if let Some(status) = child.try_wait().map_err(TransportError::Io)? {
            self.state.store(STATE_CLOSED, Ordering::SeqCst);
            return Err(TransportError::ConnectionError(format!(
                "subprocess exited immediately with {status}"
            )));
        }

        *self.child.lock().await = Some(child);
        *self.stdin.lock().await = Some(stdin);
        *self.stdout.lock().await = Some(BufReader::new(stdout));
        self.state.store(STATE_CONNECTED, Ordering::SeqCst);
        Ok(())
    }

    /// Send `method` with `params` and wait for the correlated response.
    /// Rejected unless the transport is `connected`.
    pub async fn send(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<JsonRpcResponse, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::ConnectionClosed);
        }

        // Serializes the full request/response cycle so concurrent callers
        // never consume each other's response line.
        let _guard = self.request_lock.lock().await;
        if !self.is_connected() {
            return Err(TransportError::ConnectionClosed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(id, method, params);
        let line = serde_json::to_string(&request)
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

        self.write_line(&line).await?;

        loop {
            let line = self.read_line().await?;
            match serde_json::from_str::<JsonRpcResponse>(&line) {
                Ok(response) if response.id == id => return Ok(response),
                Ok(_) => continue,
                Err(_) => continue,
            }
        }
    }

    /// Idempotent close: drops stdio, kills the subprocess if it hasn't
    /// exited, and transitions to `closed`.
    pub async fn close(&self) {
        let prior = self.state.swap(STATE_CLOSING, Ordering::SeqCst);
        if prior == STATE_CLOSED {
            self.state.store(STATE_CLOSED, Ordering::SeqCst);
            return;
        }

        if let Some(mut stdin) = self.stdin.lock().await.take() {
            let _ = stdin.shutdown().await;
        }
        self.stdout.lock().await.take();

        if let Some(mut child) = self.child.lock().await.take() {
            let wait = tokio::time::timeout(std::time::Duration::from_secs(5), child.wait()).await;
            if wait.is_err() {
                let _ = child.kill().await;
            }
        }

        self.state.store(STATE_CLOSED, Ordering::SeqCst);
    }

    /// `close` followed by `start` on the same configuration.
    pub async fn reconnect(&self) -> Result<(), TransportError> {
        self.close().await;
        self.start().await
    }

    async fn write_line(&self, json: &str) -> Result<(), TransportError> {
        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().ok_or(TransportError::ConnectionClosed)?;
        stdin.write_all(json.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    async fn read_line(&self) -> Result<String, TransportError> {
        let mut guard = self.stdout.lock().await;
        let stdout = guard.as_mut().ok_or(TransportError::ConnectionClosed)?;

        let mut skipped = 0usize;
        loop {
            let mut line = String::new();
            let n = stdout.read_line(&mut line).await?;
            if n == 0 {
                self.state.store(STATE_CLOSED, Ordering::SeqCst);
                return Err(TransportError::ConnectionClosed);
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.starts_with('{') {
                return Ok(trimmed.to_string());
            }
            skipped += 1;
            tracing::debug!(line = %trimmed, "skipping non-JSON line on MCP server stdout");
            if skipped >= MAX_SKIP_LINES {
                self.state.store(STATE_CLOSED, Ordering::SeqCst);
                return Err(TransportError::ConnectionError(
                    "too many non-JSON lines on stdout".into(),
                ));
            }
        }
    }
}

/// Turn a JSON-RPC error payload into a display-friendly string.
pub fn describe_rpc_error(err: &JsonRpcErrorPayload) -> String {
    format!("({}) {}", err.code, err.message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cat_config() -> TransportConfig {
        TransportConfig {
            command: "cat".into(),
            args: vec![],
            env: vec![],
        }
    }

    #[tokio::test]
    async fn starts_in_closed_state() {
        let transport = Transport::new(cat_config());
        assert_eq!(transport.state(), TransportState::Closed);
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn send_before_start_is_rejected() {
        let transport = Transport::new(cat_config());
        let err = transport.send("ping", None).await.unwrap_err();
        assert!(matches!(err, TransportError::ConnectionClosed));
    }

    #[tokio::test]
    async fn start_transitions_to_connected() {
        let transport = Transport::new(cat_config());
        transport.start().await.unwrap();
        assert!(transport.is_connected());
        transport.close().await;
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let transport = Transport::new(cat_config());
        transport.start().await.unwrap();
        transport.close().await;
        transport.close().await;
        assert_eq!(transport.state(), TransportState::Closed);
    }

    #[tokio::test]
    async fn nonexistent_command_fails_to_start() {
        let transport = Transport::new(TransportConfig {
            command: "definitely-not-a-real-binary-xyz".into(),
            args: vec![],
            env: vec![],
        });
        let err = transport.start().await.unwrap_err();
        assert!(matches!(err, TransportError::ConnectionError(_)));
        assert_eq!(transport.state(), TransportState::Closed);
    }
}

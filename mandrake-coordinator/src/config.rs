//! Tunables and the pluggable interactive-approval hook.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Default bound on turns within a single round (spec §4.8).
pub const DEFAULT_MAX_TURNS_PER_ROUND: u32 = 16;

/// Runtime configuration for a [`crate::SessionCoordinator`].
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Upper bound on turns started within one round before the
    /// coordinator gives up and returns with [`crate::CoordinatorExit::MaxTurns`].
    pub max_turns_per_round: u32,
    /// Minimum spacing between persisted turn updates while a stream is
    /// in flight; a forced flush still happens at every tool-call
    /// boundary and at stream end.
    pub persist_debounce: Duration,
    /// End-to-end deadline for one `provider.stream` call.
    pub provider_timeout: Duration,
    /// `max_tokens` passed to the provider on every call, if any.
    pub max_tokens: Option<u32>,
    /// `temperature` passed to the provider on every call, if any.
    pub temperature: Option<f32>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_turns_per_round: DEFAULT_MAX_TURNS_PER_ROUND,
            persist_debounce: Duration::from_millis(100),
            provider_timeout: Duration::from_secs(120),
            max_tokens: None,
            temperature: None,
        }
    }
}

/// Resolves whether a tool invocation not covered by a server's
/// `auto_approve` list may proceed.
///
/// The coordinator core has no UI of its own (spec §1 Non-goals); this
/// hook is how the presentation layer plugs in an interactive approval
/// prompt. Tools named in a server's `auto_approve` list bypass this hook
/// entirely — [`mandrake_mcp::ServerHandle::invoke_tool`] enforces that
/// directly.
#[async_trait]
pub trait ApprovalHook: Send + Sync {
    /// Resolve approval for one `server`/`tool` invocation with the given
    /// `args`. Returning `false` causes the call to fail `ToolDenied`.
    async fn approve(&self, server: &str, tool: &str, args: &Value) -> bool;
}

/// An approval hook that approves every call. Suitable for headless
/// embeddings (tests, CLIs with a `--yes` flag) that accept the risk.
pub struct AlwaysApprove;

#[async_trait]
impl ApprovalHook for AlwaysApprove {
    async fn approve(&self, _server: &str, _tool: &str, _args: &Value) -> bool {
        true
    }
}

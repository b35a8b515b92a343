#![deny(missing_docs)]
//! # mandrake-coordinator — the Session Coordinator
//!
//! Drives one session's round/turn loop: assembles context from storage,
//! streams a provider's response through the incremental tool-call parser,
//! dispatches tool calls against the MCP manager, and persists every turn
//! as it goes. One [`SessionCoordinator`] owns exactly the resources of one
//! workspace/provider pairing; `mandrake-registry` is what hands callers
//! the right instance per session.

mod config;
mod context;
mod coordinator;
mod legacy;
mod outcome;

pub use config::{AlwaysApprove, ApprovalHook, CoordinatorConfig, DEFAULT_MAX_TURNS_PER_ROUND};
pub use context::{build_history_messages, render_tool_results};
pub use coordinator::SessionCoordinator;
pub use legacy::{resolve_legacy_server, DEFAULT_SERVER, USE_MCP_TOOL};
pub use outcome::{CoordinatorExit, HandleRequestError, RoundAborted, RoundOutcome};

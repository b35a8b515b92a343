//! The conversation shape: Session → Round → {Request, Response → Turn*}.
//!
//! These are plain data records. The storage engine (`mandrake-storage`)
//! is the only thing that creates or mutates them; every other crate reads
//! them by value.

use crate::duration::DurationMs;
use crate::id::{RequestId, ResponseId, RoundId, ServerId, SessionId, TurnId, WorkspaceId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A conversation under a workspace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    /// Unique session id (UUIDv4).
    pub id: SessionId,
    /// Workspace this session belongs to, if any.
    pub workspace_id: Option<WorkspaceId>,
    /// Optional human-assigned title.
    pub title: Option<String>,
    /// Optional human-assigned description.
    pub description: Option<String>,
    /// Free-form string metadata.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last-update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// One user-request/assistant-response pair within a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Round {
    /// Unique round id.
    pub id: RoundId,
    /// Owning session.
    pub session_id: SessionId,
    /// Dense, zero-based, monotonically increasing index within the session.
    pub index: u32,
    /// This round's single request.
    pub request: Request,
    /// This round's single response (turns loaded separately via history).
    pub response_id: ResponseId,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last-update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// The user's message that started a round. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    /// Unique request id.
    pub id: RequestId,
    /// The user's message text.
    pub content: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// The assistant's reply to a round: an ordered sequence of turns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    /// Unique response id.
    pub id: ResponseId,
    /// Owning round.
    pub round_id: RoundId,
    /// Turns in index order.
    pub turns: Vec<Turn>,
}

/// One streamed assistant emission: raw text, its parsed segments, any
/// tool calls it made, and its finalized token/cost metrics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    /// Unique turn id.
    pub id: TurnId,
    /// Owning response.
    pub response_id: ResponseId,
    /// Dense, zero-based index within the response.
    pub index: u32,
    /// The raw, unparsed text the provider streamed for this turn.
    pub raw_response: String,
    /// Parsed text segments, in order (tool-call blocks are excluded).
    pub content: Vec<String>,
    /// Tool calls made during this turn, in call order.
    pub tool_calls: Vec<ToolCall>,
    /// Token/cost metrics. Zeroed until the turn is finalized.
    pub metrics: TokenMetrics,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last-update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Turn {
    /// A turn is finalized once the provider stream has ended and its
    /// metrics have been written; until then every call has either not
    /// started or has a `None` result.
    pub fn has_outstanding_call(&self) -> bool {
        self.tool_calls.iter().any(|tc| tc.result.is_none())
    }
}

/// A single tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallRecord {
    /// The server the tool belongs to.
    pub server: ServerId,
    /// The tool's name.
    pub name: String,
    /// Arbitrary JSON arguments passed to the tool, persisted verbatim.
    pub args: serde_json::Value,
}

/// A tool call paired with its (possibly not-yet-available) result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// The invocation itself.
    pub call: ToolCallRecord,
    /// Present iff the call has completed, successfully or not. A
    /// finalized turn never has `result: None` here.
    pub result: Option<ToolResult>,
}

/// The verbatim outcome of a tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResult {
    /// Whether the tool reported an error.
    pub is_error: bool,
    /// Arbitrary JSON result payload, persisted verbatim.
    pub content: serde_json::Value,
}

/// Token and cost accounting for one turn. Immutable once the turn is
/// finalized.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct TokenMetrics {
    /// Input (prompt) tokens consumed.
    pub input: u64,
    /// Output (completion) tokens produced.
    pub output: u64,
    /// Tokens served from a prompt cache read, if the provider reports it.
    pub cache_read: Option<u64>,
    /// Tokens written to a prompt cache, if the provider reports it.
    pub cache_write: Option<u64>,
    /// Cost in the provider's billing currency, computed from the price
    /// table. Never negative.
    pub cost: Decimal,
}

/// A session plus all of its rounds in index order, each carrying its
/// request and ordered response turns. Returned by a single read-consistent
/// snapshot so concurrent turn appends elsewhere can't produce a torn read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionHistory {
    /// The session itself.
    pub session: Session,
    /// Rounds in index order.
    pub rounds: Vec<Round>,
    /// Responses keyed by round, in the same order as `rounds`.
    pub responses: Vec<Response>,
}

/// Summed/averaged metrics across an entire session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct AggregatedMetrics {
    /// Sum of `turn.metrics.input` across the session.
    pub total_input_tokens: u64,
    /// Sum of `turn.metrics.output` across the session.
    pub total_output_tokens: u64,
    /// Sum of `turn.metrics.cache_read` across the session.
    pub total_cache_read_tokens: u64,
    /// Sum of `turn.metrics.cache_write` across the session.
    pub total_cache_write_tokens: u64,
    /// Sum of `turn.metrics.cost` across the session.
    pub total_cost: Decimal,
    /// Number of rounds in the session.
    pub round_count: u32,
    /// Total number of turns across all responses in the session.
    pub turn_count: u32,
    /// `turn_count as f64 / round_count as f64`, or 0.0 for an empty session.
    pub avg_turns_per_round: f64,
}

/// A single rolling health-check sample for a tool server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthSample {
    /// When the check ran.
    pub timestamp: DateTime<Utc>,
    /// Whether the check succeeded.
    pub success: bool,
    /// Observed latency.
    pub latency: DurationMs,
    /// Error detail, if the check failed.
    pub error: Option<String>,
}

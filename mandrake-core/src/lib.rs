//! # mandrake-core — shared domain types and error taxonomy
//!
//! This crate is the dependency leaf every other Mandrake crate builds on.
//! It owns nothing that touches I/O; it defines the vocabulary the rest of
//! the workspace shares:
//!
//! - typed identifiers ([`id`]) so a `SessionId` and a `ServerId` are never
//!   accidentally interchangeable;
//! - the append-only conversation shape — [`Session`], [`Round`],
//!   [`Request`], [`Response`], [`Turn`], [`ToolCall`], [`ToolResult`],
//!   [`TokenMetrics`] — that the storage engine persists and the
//!   coordinator mutates;
//! - [`Content`]/[`ContentBlock`], the message-content shape passed to
//!   providers;
//! - [`DurationMs`], a stable wire format for timeouts and intervals;
//! - [`MandrakeError`]/[`ErrorKind`], the closed error taxonomy every
//!   higher-level crate's own error type converts into at its boundary.
//!
//! Design principle carried over from its ancestor: classify errors at
//! construction time, never by matching on a message string later.

#![deny(missing_docs)]

pub mod content;
pub mod domain;
pub mod duration;
pub mod error;
pub mod id;

pub use content::{Content, ContentBlock, ImageSource};
pub use domain::{
    AggregatedMetrics, HealthSample, Request, Response, Round, Session, SessionHistory,
    TokenMetrics, ToolCall, ToolCallRecord, ToolResult, Turn,
};
pub use duration::DurationMs;
pub use error::{ErrorKind, MandrakeError};
pub use id::{RequestId, ResponseId, RoundId, ServerId, SessionId, TurnId, WorkspaceId};

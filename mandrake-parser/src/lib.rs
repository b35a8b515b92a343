//! # mandrake-parser — incremental tool-call stream parser
//!
//! Segments a model's streamed text output into [`Block::Text`] and
//! [`Block::Tool`] blocks as defined by spec §4.7, re-deriving the full
//! block sequence from the accumulated buffer on every [`StreamParser::feed`]
//! call. The [`registry`] module resolves the one place the grammar is
//! ambiguous: which tool parameters get "last closing tag wins" raw-content
//! treatment instead of the default "first closing tag wins" plain-text rule.

#![deny(missing_docs)]

mod parser;
mod registry;

pub use parser::{Block, ParamValue, StreamParser};
pub use registry::{param_kind, ParamKind};

//! # mandrake-storage — embedded relational session store
//!
//! One SQLite file per workspace, holding sessions/rounds/requests/
//! responses/turns as specified by the data model: single-writer,
//! multi-reader via WAL, foreign keys enforced, cascading delete from
//! Session. Every write happens inside a transaction; mutations publish a
//! [`SessionChangeEvent`] after commit, never before, in commit order per
//! session.
//!
//! Grounded on the `agtrace-index` crate's `rusqlite` usage (schema-init
//! idempotence via `PRAGMA user_version`, `params!`/`query_row`/
//! `query_map`, `ON CONFLICT` upserts) with WAL and a `tokio::spawn_blocking`
//! bridge added for the async coordinator this store serves.

#![deny(missing_docs)]

mod engine;
mod error;
mod events;
mod schema;

pub use engine::{ListSessionsFilter, SessionPatch, Storage, TurnPatch};
pub use error::StorageError;
pub use events::{ChangeBus, ChangeKind, SessionChangeEvent};

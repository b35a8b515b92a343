//! Typed ID wrappers for workspace, session, round, request, response, turn
//! and tool-server identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Typed ID wrappers prevent mixing up session IDs, round IDs, etc. at
/// compile time. These are plain strings underneath; storage assigns them
/// (UUIDv4 for sessions, integers stringified for everything row-keyed by
/// the backing database's rowid).
macro_rules! typed_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            /// Create a new typed ID from anything that converts to String.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the inner string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

typed_id!(WorkspaceId, "Unique identifier for a workspace.");
typed_id!(SessionId, "Unique identifier for a conversation session.");
typed_id!(RoundId, "Unique identifier for one request/response round.");
typed_id!(RequestId, "Unique identifier for a user request.");
typed_id!(ResponseId, "Unique identifier for an assistant response.");
typed_id!(TurnId, "Unique identifier for a single streamed turn.");
typed_id!(ServerId, "Unique identifier for an MCP tool server.");

impl SessionId {
    /// Generate a fresh random session id (UUIDv4), per the data model's
    /// requirement that sessions are identified by UUIDv4.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

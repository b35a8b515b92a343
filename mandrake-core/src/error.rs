//! The closed error-kind taxonomy shared at the coordinator boundary.
//!
//! Every crate in the workspace defines its own `thiserror` error enum for
//! its own operations (`StorageError`, `TransportError`, `McpError`,
//! `ProviderError`, ...). [`MandrakeError`] is what those collapse into at
//! the Session Coordinator boundary: `{kind, message, cause?}`, classified
//! once at construction, never reclassified later by matching on a message
//! string.

use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

/// Closed taxonomy of error kinds surfaced to callers of the coordinator.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad config or input shape.
    Validation,
    /// Missing session, round, server, or model.
    NotFound,
    /// A conflicting mutation, e.g. deleting the active model.
    Conflict,
    /// The target tool server is administratively disabled.
    ServerDisabled,
    /// No tool server is registered under the given id.
    ServerNotFound,
    /// The approval hook rejected a tool invocation.
    ToolDenied,
    /// A tool invocation exceeded its timeout.
    ToolTimeout,
    /// A provider-side failure; see [`ProviderErrorKind`] for the subkind.
    Provider(ProviderErrorKind),
    /// Storage I/O or integrity failure.
    Storage,
    /// Cooperative cancellation requested by the caller.
    Cancelled,
    /// Last resort; always logged with its full cause chain.
    Internal,
}

/// Subkinds of [`ErrorKind::Provider`].
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Network-level failure reaching the provider.
    Network,
    /// Authentication/authorization failure.
    Auth,
    /// The provider rate-limited this request.
    RateLimit,
    /// The request exceeded the model's context window.
    ContextLength,
    /// The provider returned a server-side error.
    Server,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::NotFound => write!(f, "not_found"),
            ErrorKind::Conflict => write!(f, "conflict"),
            ErrorKind::ServerDisabled => write!(f, "server_disabled"),
            ErrorKind::ServerNotFound => write!(f, "server_not_found"),
            ErrorKind::ToolDenied => write!(f, "tool_denied"),
            ErrorKind::ToolTimeout => write!(f, "tool_timeout"),
            ErrorKind::Provider(k) => write!(f, "provider_{k}"),
            ErrorKind::Storage => write!(f, "storage"),
            ErrorKind::Cancelled => write!(f, "cancelled"),
            ErrorKind::Internal => write!(f, "internal"),
        }
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderErrorKind::Network => write!(f, "network"),
            ProviderErrorKind::Auth => write!(f, "auth"),
            ProviderErrorKind::RateLimit => write!(f, "rate_limit"),
            ProviderErrorKind::ContextLength => write!(f, "context_length"),
            ProviderErrorKind::Server => write!(f, "server"),
        }
    }
}

/// The error returned at the coordinator boundary: a classified kind, a
/// human-readable message, and an optional cause chain.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct MandrakeError {
    kind: ErrorKind,
    message: String,
    #[source]
    cause: Option<Box<dyn StdError + Send + Sync>>,
}

impl MandrakeError {
    /// Construct an error of the given kind with a message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            cause: None,
        }
    }

    /// Attach a cause to this error, preserving its classification.
    pub fn with_cause(
        mut self,
        cause: impl StdError + Send + Sync + 'static,
    ) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// The classified kind of this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The human-readable message, independent of the cause chain.
    pub fn message(&self) -> &str {
        &self.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn display_includes_kind_and_message() {
        let err = MandrakeError::new(ErrorKind::NotFound, "session abc123 not found");
        assert_eq!(err.to_string(), "not_found: session abc123 not found");
    }

    #[test]
    fn with_cause_preserves_kind_and_sets_source() {
        let io_err = io::Error::new(io::ErrorKind::Other, "disk full");
        let err = MandrakeError::new(ErrorKind::Storage, "write failed").with_cause(io_err);
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert!(StdError::source(&err).is_some());
    }

    #[test]
    fn provider_kind_displays_nested() {
        let err = MandrakeError::new(
            ErrorKind::Provider(ProviderErrorKind::RateLimit),
            "429 from upstream",
        );
        assert_eq!(err.to_string(), "provider_rate_limit: 429 from upstream");
    }
}

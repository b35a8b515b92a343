//! Provider-side error taxonomy.

use mandrake_core::{ErrorKind, MandrakeError, ProviderErrorKind};
use thiserror::Error;

/// Errors surfaced by a [`crate::Provider::stream`] call, either before the
/// stream starts or as its terminal item.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Failed to reach the provider at the network layer.
    #[error("network error: {0}")]
    Network(String),

    /// The provider rejected our credentials.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The provider rate-limited this request.
    #[error("rate limited")]
    RateLimit,

    /// The request exceeded the model's context window.
    #[error("context length exceeded: {0}")]
    ContextLength(String),

    /// The provider returned a server-side error.
    #[error("provider server error: {0}")]
    Server(String),

    /// Catch-all for failures that don't classify cleanly.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl ProviderError {
    /// The closed subkind this error classifies as at the coordinator
    /// boundary.
    pub fn kind(&self) -> ProviderErrorKind {
        match self {
            ProviderError::Network(_) => ProviderErrorKind::Network,
            ProviderError::Auth(_) => ProviderErrorKind::Auth,
            ProviderError::RateLimit => ProviderErrorKind::RateLimit,
            ProviderError::ContextLength(_) => ProviderErrorKind::ContextLength,
            ProviderError::Server(_) | ProviderError::Other(_) => ProviderErrorKind::Server,
        }
    }
}

impl From<ProviderError> for MandrakeError {
    fn from(err: ProviderError) -> Self {
        let kind = ErrorKind::Provider(err.kind());
        MandrakeError::new(kind, err.to_string()).with_cause(err)
    }
}

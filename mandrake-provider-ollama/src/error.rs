//! Maps HTTP/reqwest-layer failures onto [`mandrake_provider::ProviderError`].

use mandrake_provider::ProviderError;

/// Map an Ollama API HTTP status code to a [`ProviderError`].
///
/// Reference: <https://github.com/ollama/ollama/blob/main/docs/api.md>
pub(crate) fn map_http_status(status: reqwest::StatusCode, body: &str) -> ProviderError {
    match status.as_u16() {
        404 => ProviderError::Server(format!("model not found: {body}")),
        400..=499 => ProviderError::Server(format!("HTTP {status}: {body}")),
        500..=599 => ProviderError::Server(format!("HTTP {status}: {body}")),
        _ => ProviderError::Server(format!("HTTP {status}: {body}")),
    }
}

/// Map a [`reqwest::Error`] to a [`ProviderError`].
pub(crate) fn map_reqwest_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Network(format!("request timed out: {err}"))
    } else if err.is_connect() {
        ProviderError::Network(format!(
            "could not reach Ollama (is it running?): {err}"
        ))
    } else {
        ProviderError::Network(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_404_is_reported_as_server_error() {
        let err = map_http_status(reqwest::StatusCode::NOT_FOUND, "model 'foo' not found");
        assert!(matches!(err, ProviderError::Server(msg) if msg.contains("model 'foo' not found")));
    }

    #[test]
    fn status_500_is_server_error() {
        let err = map_http_status(reqwest::StatusCode::INTERNAL_SERVER_ERROR, "oom");
        assert!(matches!(err, ProviderError::Server(_)));
    }
}

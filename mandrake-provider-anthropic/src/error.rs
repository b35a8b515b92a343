//! Maps HTTP/reqwest-layer failures onto [`mandrake_provider::ProviderError`].

use mandrake_provider::ProviderError;

/// Map an Anthropic API HTTP status code to a [`ProviderError`].
///
/// Reference: <https://docs.anthropic.com/en/api/errors>
pub(crate) fn map_http_status(status: reqwest::StatusCode, body: &str) -> ProviderError {
    match status.as_u16() {
        401 | 403 => ProviderError::Auth(body.to_string()),
        429 => ProviderError::RateLimit,
        400 if body.contains("context_length") || body.contains("prompt is too long") => {
            ProviderError::ContextLength(body.to_string())
        }
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
        ProviderError::Network(format!("connection failed: {err}"))
    } else {
        ProviderError::Network(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_maps_to_rate_limit() {
        let err = map_http_status(reqwest::StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert!(matches!(err, ProviderError::RateLimit));
    }

    #[test]
    fn unauthorized_maps_to_auth() {
        let err = map_http_status(reqwest::StatusCode::UNAUTHORIZED, "bad key");
        assert!(matches!(err, ProviderError::Auth(_)));
    }

    #[test]
    fn context_length_phrase_is_detected() {
        let err = map_http_status(
            reqwest::StatusCode::BAD_REQUEST,
            "prompt is too long: 250000 tokens",
        );
        assert!(matches!(err, ProviderError::ContextLength(_)));
    }

    #[test]
    fn generic_bad_request_maps_to_server() {
        let err = map_http_status(reqwest::StatusCode::BAD_REQUEST, "malformed json");
        assert!(matches!(err, ProviderError::Server(_)));
    }
}

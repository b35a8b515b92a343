//! The Anthropic provider implementation itself.

use async_trait::async_trait;
use futures_util::StreamExt;
use mandrake_provider::{ChunkStream, Provider, ProviderError, ProviderRequest};

use crate::error::map_http_status;
use crate::mapping::to_api_request;
use crate::streaming::stream_completion;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Streaming provider for Anthropic's Messages API.
///
/// Cheap to clone: holds a pooled [`reqwest::Client`] plus static
/// configuration, so callers typically share one instance behind an `Arc`.
#[derive(Clone)]
pub struct AnthropicProvider {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Create a provider for `model`, authenticating with `api_key`.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Override the API base URL — used in tests against a mock server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    async fn stream(&self, request: ProviderRequest) -> Result<ChunkStream, ProviderError> {
        let body = to_api_request(&request, &self.model, DEFAULT_MAX_TOKENS);
        tracing::debug!(model = %self.model, message_count = body.messages.len(), "starting anthropic stream");
        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(crate::error::map_reqwest_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body_text = response.text().await.unwrap_or_default();
            tracing::warn!(%status, "anthropic request rejected");
            return Err(map_http_status(status, &body_text));
        }

        Ok(stream_completion(response).boxed())
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mandrake_provider::{ProviderMessage, Role};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> ProviderRequest {
        ProviderRequest {
            system: "be helpful".to_string(),
            messages: vec![ProviderMessage::user("hi")],
            tools: vec![],
            max_tokens: None,
            temperature: None,
        }
    }

    #[tokio::test]
    async fn streams_text_deltas_from_a_mock_server() {
        let server = MockServer::start().await;
        let sse_body = concat!(
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"hi\"}}\n",
            "\n",
            "event: message_stop\n",
            "data: {\"type\":\"message_stop\"}\n",
            "\n",
        );
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-key"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(sse_body, "text/event-stream"),
            )
            .mount(&server)
            .await;

        let provider = AnthropicProvider::new("test-key", "claude-haiku-4-5").with_base_url(server.uri());
        let mut stream = provider.stream(request()).await.unwrap();
        let mut chunks = vec![];
        while let Some(chunk) = stream.next().await {
            chunks.push(chunk.unwrap());
        }
        assert!(chunks
            .iter()
            .any(|c| matches!(c, mandrake_provider::Chunk::Text(t) if t == "hi")));
        assert!(matches!(chunks.last(), Some(mandrake_provider::Chunk::End)));
    }

    #[tokio::test]
    async fn non_2xx_response_maps_to_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let provider = AnthropicProvider::new("bad-key", "claude-haiku-4-5").with_base_url(server.uri());
        let err = provider.stream(request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Auth(_)));
    }
}

//! The Ollama provider implementation itself.

use async_trait::async_trait;
use futures_util::StreamExt;
use mandrake_provider::{ChunkStream, Provider, ProviderError, ProviderRequest};

use crate::error::map_http_status;
use crate::mapping::to_api_request;
use crate::streaming::stream_completion;

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Streaming provider for a local or remote Ollama server.
///
/// Cheap to clone: holds a pooled [`reqwest::Client`] plus static
/// configuration. No authentication is required, matching Ollama's local
/// deployment model.
#[derive(Clone)]
pub struct OllamaProvider {
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl OllamaProvider {
    /// Create a provider for `model` against the default local Ollama
    /// instance (`http://localhost:11434`).
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Point at a different Ollama instance — used in tests and for remote
    /// deployments.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    async fn stream(&self, request: ProviderRequest) -> Result<ChunkStream, ProviderError> {
        let body = to_api_request(&request, &self.model);
        tracing::debug!(model = %self.model, message_count = body.messages.len(), "starting ollama stream");
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(crate::error::map_reqwest_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body_text = response.text().await.unwrap_or_default();
            tracing::warn!(%status, "ollama request rejected");
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
    use mandrake_provider::{Chunk, ProviderMessage};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> ProviderRequest {
        ProviderRequest {
            system: String::new(),
            messages: vec![ProviderMessage::user("hi")],
            tools: vec![],
            max_tokens: None,
            temperature: None,
        }
    }

    #[tokio::test]
    async fn streams_text_then_usage_then_end_from_mock_server() {
        let server = MockServer::start().await;
        let ndjson_body = concat!(
            "{\"model\":\"llama3.2\",\"message\":{\"role\":\"assistant\",\"content\":\"hi\"},\"done\":false}\n",
            "{\"model\":\"llama3.2\",\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true,\"eval_count\":5,\"prompt_eval_count\":10}\n",
        );
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(ndjson_body, "application/x-ndjson"))
            .mount(&server)
            .await;

        let provider = OllamaProvider::new("llama3.2").with_base_url(server.uri());
        let mut stream = provider.stream(request()).await.unwrap();
        let mut chunks = vec![];
        while let Some(chunk) = stream.next().await {
            chunks.push(chunk.unwrap());
        }
        assert!(chunks.iter().any(|c| matches!(c, Chunk::Text(t) if t == "hi")));
        assert!(matches!(chunks.last(), Some(Chunk::End)));
    }

    #[tokio::test]
    async fn server_error_maps_to_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(404).set_body_string("model not found"))
            .mount(&server)
            .await;

        let provider = OllamaProvider::new("missing-model").with_base_url(server.uri());
        let err = provider.stream(request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Server(_)));
    }
}

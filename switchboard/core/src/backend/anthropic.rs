//! Anthropic Backend Implementation
//!
//! Claude models over the Anthropic Messages API (`/v1/messages`). Streamed
//! responses arrive as typed events; text is carried by `content_block_delta`
//! and the response ends with `message_stop`.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;

use super::http::{AdapterConfig, AdapterCore, Frame};
use super::pricing::anthropic_price;
use super::sse::SseEvent;
use super::tokens::{estimate_tokens, TokenCounter};
use crate::provider::{
    BackendError, ChunkStream, CompletionRequest, ProviderAdapter, ProviderStats,
};

/// Provider id
pub const ANTHROPIC_ID: &str = "anthropic";

/// Public API host
pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";

/// API version header value
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Token limit of the health probe
const HEALTH_MAX_TOKENS: u32 = 10;

/// Anthropic Messages API adapter
pub struct AnthropicAdapter {
    core: AdapterCore,
}

impl AnthropicAdapter {
    /// Create an adapter
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::NotConfigured`] if the HTTP client cannot be built.
    pub fn new(config: AdapterConfig) -> Result<Self, BackendError> {
        Ok(Self {
            core: AdapterCore::new(ANTHROPIC_ID, config, ANTHROPIC_BASE_URL)?,
        })
    }

    fn messages_request(
        &self,
        model: &str,
        prompt: &str,
        max_tokens: u32,
        stream: bool,
    ) -> reqwest::RequestBuilder {
        let body = serde_json::json!({
            "model": model,
            "max_tokens": max_tokens,
            "messages": [{"role": "user", "content": prompt}],
            "stream": stream,
        });

        self.core
            .client
            .post(format!("{}/v1/messages", self.core.base_url))
            .header("x-api-key", &self.core.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
    }
}

fn parse_frame(event: &SseEvent) -> Result<Frame, BackendError> {
    let value: serde_json::Value =
        serde_json::from_str(&event.data).map_err(|e| BackendError::Decode(e.to_string()))?;

    let kind = value
        .get("type")
        .and_then(|t| t.as_str())
        .or(event.event.as_deref())
        .unwrap_or_default();

    match kind {
        "content_block_delta" => Ok(value
            .pointer("/delta/text")
            .and_then(|t| t.as_str())
            .map_or(Frame::Skip, |text| Frame::Text(text.to_string()))),
        "message_stop" => Ok(Frame::Done),
        "error" => {
            let message = value
                .pointer("/error/message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown error");
            Err(BackendError::Stream(message.to_string()))
        }
        _ => Ok(Frame::Skip),
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn id(&self) -> &str {
        ANTHROPIC_ID
    }

    fn current_model(&self) -> String {
        self.core.model()
    }

    fn set_model(&self, model: &str) {
        self.core.set_model(model);
    }

    async fn query(&self, request: &CompletionRequest) -> Result<ChunkStream, BackendError> {
        let mut http = self.messages_request(
            &request.model,
            &request.prompt,
            request.max_tokens,
            request.stream,
        );
        if !request.stream {
            http = http.timeout(self.core.timeout);
        }

        let response = self.core.send(http).await?;
        let price = anthropic_price(&request.model);

        if request.stream {
            return Ok(self.core.stream(
                response,
                &request.prompt,
                price,
                Arc::new(TokenCounter::CharEstimate),
                parse_frame,
            ));
        }

        let data = self.core.json(response).await?;
        let Some(content) = data.pointer("/content/0/text").and_then(|t| t.as_str()) else {
            return Err(self
                .core
                .fail(BackendError::Decode("response has no text content".to_string())));
        };

        // Whole responses report exact usage; fall back to the estimate
        let usage = |field: &str| data.pointer(&format!("/usage/{field}")).and_then(|v| v.as_u64());
        let input_tokens = usage("input_tokens").unwrap_or_else(|| estimate_tokens(&request.prompt));
        let output_tokens = usage("output_tokens").unwrap_or_else(|| estimate_tokens(content));

        self.core.record_success(price, input_tokens, output_tokens);
        Ok(futures::stream::iter([Ok(content.to_string())]).boxed())
    }

    fn snapshot_stats(&self) -> ProviderStats {
        self.core.snapshot()
    }

    async fn health_check(&self) -> bool {
        let probe = self
            .messages_request(&self.core.model(), "Hi", HEALTH_MAX_TOKENS, false)
            .timeout(self.core.timeout);

        match probe.send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(provider = ANTHROPIC_ID, error = %e, "Health check failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn adapter(server: &mockito::Server) -> AnthropicAdapter {
        AnthropicAdapter::new(
            AdapterConfig::new("sk-ant-test", "claude-3-sonnet-20240229")
                .with_base_url(server.url()),
        )
        .unwrap()
    }

    const STREAM_BODY: &str = "event: message_start\n\
        data: {\"type\":\"message_start\",\"message\":{}}\n\n\
        event: content_block_delta\n\
        data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Bonjour\"}}\n\n\
        event: content_block_delta\n\
        data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\" monde\"}}\n\n\
        event: message_stop\n\
        data: {\"type\":\"message_stop\"}\n\n";

    #[tokio::test]
    async fn test_streaming_completion() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages")
            .match_header("x-api-key", "sk-ant-test")
            .match_header("anthropic-version", ANTHROPIC_VERSION)
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(STREAM_BODY)
            .create_async()
            .await;

        let adapter = adapter(&server);
        let request = CompletionRequest::new("Say hello", "claude-3-sonnet-20240229");
        let chunks: Vec<_> = adapter.query(&request).await.unwrap().collect().await;

        assert_eq!(
            chunks,
            vec![Ok("Bonjour".to_string()), Ok(" monde".to_string())]
        );
        mock.assert_async().await;
        assert_eq!(adapter.snapshot_stats().request_count, 1);
    }

    #[tokio::test]
    async fn test_stream_error_event() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/messages")
            .with_status(200)
            .with_body(
                "event: error\n\
                 data: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}\n\n",
            )
            .create_async()
            .await;

        let adapter = adapter(&server);
        let chunks: Vec<_> = adapter
            .query(&CompletionRequest::new("hi", "claude-3-sonnet-20240229"))
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(
            chunks,
            vec![Err(BackendError::Stream("Overloaded".to_string()))]
        );
        let stats = adapter.snapshot_stats();
        assert_eq!((stats.request_count, stats.error_count), (1, 1));
    }

    #[tokio::test]
    async fn test_non_streaming_uses_reported_usage() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/messages")
            .with_status(200)
            .with_body(
                r#"{"content":[{"type":"text","text":"Done"}],"usage":{"input_tokens":12,"output_tokens":3}}"#,
            )
            .create_async()
            .await;

        let adapter = adapter(&server);
        let request = CompletionRequest::new("hi", "claude-3-sonnet-20240229").with_stream(false);
        let chunks: Vec<_> = adapter.query(&request).await.unwrap().collect().await;

        assert_eq!(chunks, vec![Ok("Done".to_string())]);
        assert_eq!(adapter.snapshot_stats().total_tokens, 15);
    }

    #[tokio::test]
    async fn test_health_check_sends_minimal_message() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages")
            .match_body(mockito::Matcher::PartialJson(
                serde_json::json!({"max_tokens": 10}),
            ))
            .with_status(200)
            .with_body(r#"{"content":[{"type":"text","text":"Hello"}]}"#)
            .create_async()
            .await;

        let adapter = adapter(&server);
        assert!(adapter.health_check().await);
        mock.assert_async().await;
        // probes are not billed to the provider
        assert_eq!(adapter.snapshot_stats().request_count, 0);
    }
}

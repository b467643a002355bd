//! OpenAI Backend Implementation
//!
//! Chat completions over the OpenAI REST API.
//!
//! # OpenAI API
//!
//! - `/v1/chat/completions` - Completions, streamed as `data:` events ending
//!   with `data: [DONE]`
//! - `/v1/models` - Model listing, used as the health probe

use async_trait::async_trait;
use futures::StreamExt;

use super::http::{AdapterConfig, AdapterCore, Frame};
use super::pricing::openai_price;
use super::sse::SseEvent;
use super::tokens::OpenAiCounters;
use crate::provider::{
    BackendError, ChunkStream, CompletionRequest, ProviderAdapter, ProviderStats,
};

/// Provider id
pub const OPENAI_ID: &str = "openai";

/// Public API host
pub const OPENAI_BASE_URL: &str = "https://api.openai.com";

/// OpenAI chat completions adapter
pub struct OpenAiAdapter {
    core: AdapterCore,
    counters: OpenAiCounters,
}

impl OpenAiAdapter {
    /// Create an adapter
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::NotConfigured`] if the HTTP client cannot be built.
    pub fn new(config: AdapterConfig) -> Result<Self, BackendError> {
        Ok(Self {
            core: AdapterCore::new(OPENAI_ID, config, OPENAI_BASE_URL)?,
            counters: OpenAiCounters::default(),
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.core.base_url)
    }

    fn models_url(&self) -> String {
        format!("{}/v1/models", self.core.base_url)
    }
}

/// Extract the delta text of one streamed chunk
fn parse_frame(event: &SseEvent) -> Result<Frame, BackendError> {
    let data = event.data.trim();
    if data == "[DONE]" {
        return Ok(Frame::Done);
    }

    let value: serde_json::Value =
        serde_json::from_str(data).map_err(|e| BackendError::Decode(e.to_string()))?;

    if let Some(error) = value.get("error") {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown error");
        return Err(BackendError::Stream(message.to_string()));
    }

    Ok(value
        .pointer("/choices/0/delta/content")
        .and_then(|c| c.as_str())
        .map_or(Frame::Skip, |text| Frame::Text(text.to_string())))
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn id(&self) -> &str {
        OPENAI_ID
    }

    fn current_model(&self) -> String {
        self.core.model()
    }

    fn set_model(&self, model: &str) {
        self.core.set_model(model);
    }

    async fn query(&self, request: &CompletionRequest) -> Result<ChunkStream, BackendError> {
        let body = serde_json::json!({
            "model": request.model,
            "messages": [{"role": "user", "content": request.prompt}],
            "stream": request.stream,
        });

        let mut http = self
            .core
            .client
            .post(self.completions_url())
            .bearer_auth(&self.core.api_key)
            .json(&body);
        if !request.stream {
            http = http.timeout(self.core.timeout);
        }

        let response = self.core.send(http).await?;
        let price = openai_price(&request.model);
        let counter = self.counters.get(&request.model);

        if request.stream {
            return Ok(self
                .core
                .stream(response, &request.prompt, price, counter, parse_frame));
        }

        let data = self.core.json(response).await?;
        let Some(content) = data
            .pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
        else {
            return Err(self
                .core
                .fail(BackendError::Decode("response has no message content".to_string())));
        };

        self.core.record_success(
            price,
            counter.count(&request.prompt),
            counter.count(content),
        );
        Ok(futures::stream::iter([Ok(content.to_string())]).boxed())
    }

    fn snapshot_stats(&self) -> ProviderStats {
        self.core.snapshot()
    }

    async fn health_check(&self) -> bool {
        match self
            .core
            .client
            .get(self.models_url())
            .bearer_auth(&self.core.api_key)
            .timeout(self.core.timeout)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(provider = OPENAI_ID, error = %e, "Health check failed");
                false
            }
        }
    }
}

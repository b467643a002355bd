//! Google Backend Implementation
//!
//! Gemini models over the Generative Language API. Streaming uses
//! `:streamGenerateContent?alt=sse`, where every event carries a full
//! `GenerateContentResponse` fragment and the stream simply ends; there is no
//! terminator event.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;

use super::http::{AdapterConfig, AdapterCore, Frame};
use super::pricing::google_price;
use super::sse::SseEvent;
use super::tokens::{estimate_tokens, TokenCounter};
use crate::provider::{
    BackendError, ChunkStream, CompletionRequest, ProviderAdapter, ProviderStats,
};

/// Provider id
pub const GOOGLE_ID: &str = "google";

/// Public API host
pub const GOOGLE_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Google Gemini adapter
pub struct GoogleAdapter {
    core: AdapterCore,
}

impl GoogleAdapter {
    /// Create an adapter
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::NotConfigured`] if the HTTP client cannot be built.
    pub fn new(config: AdapterConfig) -> Result<Self, BackendError> {
        Ok(Self {
            core: AdapterCore::new(GOOGLE_ID, config, GOOGLE_BASE_URL)?,
        })
    }

    fn generate_request(&self, model: &str, prompt: &str, stream: bool) -> reqwest::RequestBuilder {
        let url = if stream {
            format!(
                "{}/v1beta/models/{model}:streamGenerateContent?alt=sse",
                self.core.base_url
            )
        } else {
            format!("{}/v1beta/models/{model}:generateContent", self.core.base_url)
        };
        let body = serde_json::json!({
            "contents": [{"role": "user", "parts": [{"text": prompt}]}],
        });

        self.core
            .client
            .post(url)
            .header("x-goog-api-key", &self.core.api_key)
            .json(&body)
    }
}

/// Concatenated text of the first candidate
///
/// `None` means the fragment carried no text and nothing went wrong, such as
/// a closing fragment with only usage metadata. A blocked prompt, or a
/// candidate that stopped for any reason other than `STOP` without producing
/// text, is an error so the request can fall back.
fn candidate_text(value: &serde_json::Value) -> Result<Option<String>, BackendError> {
    if let Some(message) = value.pointer("/error/message").and_then(|m| m.as_str()) {
        return Err(BackendError::Stream(message.to_string()));
    }

    if let Some(reason) = value
        .pointer("/promptFeedback/blockReason")
        .and_then(|r| r.as_str())
    {
        return Err(BackendError::Stream(format!("prompt blocked: {reason}")));
    }

    let text: Option<String> = value
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
                .collect()
        });
    let finish_reason = value
        .pointer("/candidates/0/finishReason")
        .and_then(|r| r.as_str());

    match (text, finish_reason) {
        (Some(text), _) if !text.is_empty() => Ok(Some(text)),
        (_, Some(reason)) if reason != "STOP" => Err(BackendError::Stream(format!(
            "response blocked: {reason}"
        ))),
        (text, _) => Ok(text),
    }
}

fn parse_frame(event: &SseEvent) -> Result<Frame, BackendError> {
    let value: serde_json::Value =
        serde_json::from_str(&event.data).map_err(|e| BackendError::Decode(e.to_string()))?;

    Ok(candidate_text(&value)?.map_or(Frame::Skip, Frame::Text))
}

#[async_trait]
impl ProviderAdapter for GoogleAdapter {
    fn id(&self) -> &str {
        GOOGLE_ID
    }

    fn current_model(&self) -> String {
        self.core.model()
    }

    fn set_model(&self, model: &str) {
        self.core.set_model(model);
    }

    async fn query(&self, request: &CompletionRequest) -> Result<ChunkStream, BackendError> {
        let mut http = self.generate_request(&request.model, &request.prompt, request.stream);
        if !request.stream {
            http = http.timeout(self.core.timeout);
        }

        let response = self.core.send(http).await?;
        let price = google_price(&request.model);

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
        let content = match candidate_text(&data) {
            Ok(Some(text)) => text,
            Ok(None) => {
                return Err(self
                    .core
                    .fail(BackendError::Decode("response has no candidates".to_string())))
            }
            Err(e) => return Err(self.core.fail(e)),
        };

        self.core.record_success(
            price,
            estimate_tokens(&request.prompt),
            estimate_tokens(&content),
        );
        Ok(futures::stream::iter([Ok(content)]).boxed())
    }

    fn snapshot_stats(&self) -> ProviderStats {
        self.core.snapshot()
    }

    async fn health_check(&self) -> bool {
        let probe = self
            .generate_request(&self.core.model(), "Hi", false)
            .timeout(self.core.timeout);

        match probe.send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(provider = GOOGLE_ID, error = %e, "Health check failed");
                false
            }
        }
    }
}

//! Shared plumbing for the HTTP vendor adapters.
//!
//! # Streaming
//!
//! ```text
//! reqwest body ──► SseDecoder ──► vendor frame parser ──► mpsc ──► ChunkStream
//!                   (reader task, one per request)
//! ```
//!
//! The reader task owns the response. It stops as soon as the receiving
//! stream is dropped, which closes the connection. Usage is recorded by the
//! task before the channel closes, so a stats snapshot taken after the stream
//! ends already includes the request.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::pricing::ModelPrice;
use super::sse::{SseDecoder, SseEvent};
use super::tokens::TokenCounter;
use crate::provider::{BackendError, ChunkStream, ProviderStats, UsageTracker};

/// Buffered chunks between the reader task and the consumer
const CHANNEL_CAPACITY: usize = 64;

/// Longest error body kept in a [`BackendError::Status`]
const MAX_ERROR_BODY: usize = 512;

/// Settings for one vendor adapter
#[derive(Clone)]
pub struct AdapterConfig {
    /// Vendor API key
    pub api_key: String,
    /// Initial model
    pub model: String,
    /// Base URL override (scheme and host, no trailing path)
    pub base_url: Option<String>,
    /// Connect timeout, and total timeout for non-streaming calls
    pub timeout: Duration,
}

impl std::fmt::Debug for AdapterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl AdapterConfig {
    /// Create a config with the default timeout
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: None,
            timeout: Duration::from_secs(30),
        }
    }

    /// Point the adapter at another host
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the request timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// What a vendor frame parser found in one event
pub(crate) enum Frame {
    /// Text to forward
    Text(String),
    /// Nothing of interest
    Skip,
    /// The vendor signalled the end of the response
    Done,
}

/// State every HTTP adapter carries
pub(crate) struct AdapterCore {
    pub id: &'static str,
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
    pub client: reqwest::Client,
    model: RwLock<String>,
    usage: Arc<UsageTracker>,
}

impl AdapterCore {
    pub fn new(
        id: &'static str,
        config: AdapterConfig,
        default_base_url: &str,
    ) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.timeout)
            .build()
            .map_err(|e| BackendError::NotConfigured(format!("failed to build HTTP client: {e}")))?;

        let base_url = config
            .base_url
            .unwrap_or_else(|| default_base_url.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            id,
            api_key: config.api_key,
            base_url,
            timeout: config.timeout,
            client,
            model: RwLock::new(config.model),
            usage: Arc::new(UsageTracker::new()),
        })
    }

    pub fn model(&self) -> String {
        self.model.read().clone()
    }

    pub fn set_model(&self, model: &str) {
        *self.model.write() = model.to_string();
    }

    pub fn snapshot(&self) -> ProviderStats {
        self.usage.snapshot(self.id, &self.model())
    }

    pub fn record_success(&self, price: ModelPrice, input_tokens: u64, output_tokens: u64) {
        self.usage
            .record_success(input_tokens + output_tokens, price.cost(input_tokens, output_tokens));
    }

    /// Send a request, counting transport failures and error statuses
    pub async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, BackendError> {
        let result = match request.send().await {
            Ok(response) if response.status().is_success() => Ok(response),
            Ok(response) => {
                let status = response.status().as_u16();
                let mut body = response.text().await.unwrap_or_default();
                truncate(&mut body, MAX_ERROR_BODY);
                Err(BackendError::Status { status, body })
            }
            Err(e) => Err(BackendError::from(e)),
        };

        if let Err(ref e) = result {
            tracing::debug!(provider = self.id, error = %e, "Request rejected");
            self.usage.record_failure();
        }
        result
    }

    /// Read a whole JSON body, counting decode failures
    pub async fn json(&self, response: reqwest::Response) -> Result<serde_json::Value, BackendError> {
        match response.json::<serde_json::Value>().await {
            Ok(value) => Ok(value),
            Err(e) => {
                self.usage.record_failure();
                Err(BackendError::Decode(e.to_string()))
            }
        }
    }

    /// Count a failure found while interpreting a whole response
    pub fn fail(&self, error: BackendError) -> BackendError {
        self.usage.record_failure();
        error
    }

    /// Hand an event-stream response to a reader task
    pub fn stream<F>(
        &self,
        response: reqwest::Response,
        prompt: &str,
        price: ModelPrice,
        counter: Arc<TokenCounter>,
        parse: F,
    ) -> ChunkStream
    where
        F: Fn(&SseEvent) -> Result<Frame, BackendError> + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let usage = Arc::clone(&self.usage);
        let input_tokens = counter.count(prompt);
        let id = self.id;

        tokio::spawn(async move {
            let mut output = String::new();
            match pump(response, &tx, &parse, &mut output).await {
                Ok(Pump::Finished) => {
                    let output_tokens = counter.count(&output);
                    usage.record_success(
                        input_tokens + output_tokens,
                        price.cost(input_tokens, output_tokens),
                    );
                }
                Ok(Pump::Cancelled) => {
                    tracing::debug!(provider = id, "Stream dropped by consumer");
                }
                Err(e) => {
                    usage.record_failure();
                    let _ = tx.send(Err(e)).await;
                }
            }
        });

        ReceiverStream::new(rx).boxed()
    }
}

enum Pump {
    Finished,
    Cancelled,
}

type ChunkSender = mpsc::Sender<Result<String, BackendError>>;

async fn pump<F>(
    response: reqwest::Response,
    tx: &ChunkSender,
    parse: &F,
    output: &mut String,
) -> Result<Pump, BackendError>
where
    F: Fn(&SseEvent) -> Result<Frame, BackendError>,
{
    let mut body = response.bytes_stream();
    let mut decoder = SseDecoder::default();

    loop {
        let chunk = tokio::select! {
            chunk = body.next() => chunk,
            () = tx.closed() => return Ok(Pump::Cancelled),
        };

        let (events, ended) = match chunk {
            Some(Ok(bytes)) => (decoder.push(&bytes), false),
            Some(Err(e)) => return Err(BackendError::Stream(e.to_string())),
            None => (decoder.finish().into_iter().collect(), true),
        };

        for event in &events {
            match parse(event)? {
                Frame::Text(text) if text.is_empty() => {}
                Frame::Text(text) => {
                    output.push_str(&text);
                    if tx.send(Ok(text)).await.is_err() {
                        return Ok(Pump::Cancelled);
                    }
                }
                Frame::Skip => {}
                Frame::Done => return Ok(Pump::Finished),
            }
        }

        if ended {
            return Ok(Pump::Finished);
        }
    }
}

fn truncate(text: &mut String, max: usize) {
    if text.len() > max {
        let mut end = max;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
}

//! Provider Adapter Traits
//!
//! Trait definitions for text-generation backends. This abstraction lets the
//! router dispatch to OpenAI, Anthropic, Google (or a test double) without
//! knowing anything vendor-specific.
//!
//! # Contract
//!
//! - `query` returns a lazy, single-use sequence of text chunks. Any failure,
//!   including one in the middle of the stream, is reported as a
//!   [`BackendError`] item. Dropping the stream cancels the request.
//! - `current_model` / `set_model` expose the model the adapter uses when a
//!   request does not name one.
//! - `snapshot_stats` returns a consistent copy of the usage counters.
//! - `health_check` never fails; problems are reported as `false`.

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

use super::stats::ProviderStats;

/// Lazy sequence of text chunks produced by a provider
pub type ChunkStream = BoxStream<'static, Result<String, BackendError>>;

/// Errors raised by a provider adapter
///
/// All of these are recoverable from the router's point of view: the attempt
/// is abandoned and the next provider in the fallback order is tried.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BackendError {
    /// Transport-level failure (connect, timeout, TLS)
    #[error("request failed: {0}")]
    Http(String),

    /// The provider answered with a non-success HTTP status
    #[error("provider returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body (truncated by the adapter if large)
        body: String,
    },

    /// The response stream broke after it started
    #[error("stream interrupted: {0}")]
    Stream(String),

    /// The provider sent something we could not understand
    #[error("malformed response: {0}")]
    Decode(String),

    /// The adapter has no usable client or credentials
    #[error("provider not configured: {0}")]
    NotConfigured(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

/// A single completion request handed to an adapter
#[derive(Clone, Debug)]
pub struct CompletionRequest {
    /// The user's query
    pub prompt: String,
    /// Model to use (vendor-specific identifier)
    pub model: String,
    /// Whether to stream the response
    pub stream: bool,
    /// Maximum tokens in the response
    pub max_tokens: u32,
}

impl CompletionRequest {
    /// Create a streaming request with the default token limit
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            stream: true,
            max_tokens: 4096,
        }
    }

    /// Set streaming mode
    #[must_use]
    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Set max tokens
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Provider adapter trait
///
/// Implement this trait to make a backend available to the router.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Stable provider id (e.g. "openai")
    fn id(&self) -> &str;

    /// Model used when a request does not override it
    fn current_model(&self) -> String;

    /// Replace the active model
    fn set_model(&self, model: &str);

    /// Start a completion and return its chunk stream
    ///
    /// An error returned here means the request failed before producing any
    /// output. Errors after that arrive as items of the stream.
    async fn query(&self, request: &CompletionRequest) -> Result<ChunkStream, BackendError>;

    /// Point-in-time copy of the usage counters
    fn snapshot_stats(&self) -> ProviderStats;

    /// Cheap liveness probe
    async fn health_check(&self) -> bool;
}

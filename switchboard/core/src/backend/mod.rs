//! Vendor Backend Integration
//!
//! Concrete [`ProviderAdapter`](crate::provider::ProviderAdapter)
//! implementations for the hosted LLM APIs, and the factory that turns
//! settings into a [`ProviderRegistry`](crate::provider::ProviderRegistry).
//!
//! # Available Backends
//!
//! - **OpenAI**: chat completions
//! - **Anthropic**: Claude messages
//! - **Google**: Gemini generate content
//!
//! All three stream over server-sent events and share the same reader task
//! and usage accounting. OpenAI usage is counted with the model's tokenizer,
//! the others with a character estimate.
//!
//! # Usage
//!
//! ```ignore
//! use switchboard_core::backend::{AdapterConfig, OpenAiAdapter};
//! use switchboard_core::provider::{CompletionRequest, ProviderAdapter};
//!
//! let adapter = OpenAiAdapter::new(AdapterConfig::new(api_key, "gpt-4"))?;
//! let mut chunks = adapter.query(&CompletionRequest::new("Hello!", "gpt-4")).await?;
//! ```

mod anthropic;
mod factory;
mod google;
mod http;
mod openai;
pub mod pricing;
mod sse;
pub mod tokens;

pub use anthropic::{AnthropicAdapter, ANTHROPIC_BASE_URL, ANTHROPIC_ID};
pub use factory::{build_registry, create_adapter, NOT_CONFIGURED};
pub use google::{GoogleAdapter, GOOGLE_BASE_URL, GOOGLE_ID};
pub use http::AdapterConfig;
pub use openai::{OpenAiAdapter, OPENAI_BASE_URL, OPENAI_ID};
pub use sse::{SseDecoder, SseEvent};
pub use tokens::{estimate_tokens, TokenCounter};

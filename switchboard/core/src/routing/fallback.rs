//! Fallback Orchestration
//!
//! Drives a routing decision to completion: providers in the fallback order are
//! attempted one at a time until one streams its response to the end.
//!
//! # State Machine
//!
//! ```text
//! Decided ──► Attempting(p) ──► Streaming(p) ──► Succeeded
//!                 │   ▲              │
//!                 ▼   │              ▼
//!             Failed(p) ◄────────────┘
//!                 │
//!                 ▼ (order exhausted)
//!             AllFailed
//! ```
//!
//! The output is a lazy stream of [`StreamEvent`]s. Nothing happens until the
//! consumer polls it, and dropping it cancels the active provider request: the
//! provider's chunk stream is dropped with the orchestrator state.
//!
//! Content already emitted by a provider that later fails is not retracted.
//! Consumers should discard a provider's content when a `ProviderError` for
//! that provider arrives without a `Complete`.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Serialize;
use tracing::{info, warn, Instrument};

use super::engine::RoutingDecision;
use crate::provider::{
    BackendError, ChunkStream, CompletionRequest, ProviderAdapter, ProviderRegistry, ProviderStats,
};

/// Fatal error when the decision has no provider to try
pub const FATAL_NO_PROVIDERS: &str = "no providers available";
/// Fatal error when every provider in the order failed
pub const FATAL_ALL_FAILED: &str = "all providers failed";

/// Ordered stream of events for one query
pub type EventStream = BoxStream<'static, StreamEvent>;

/// Status carried by a [`StreamEvent::ProviderAttempt`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    /// Request sent, no output yet
    Attempting,
    /// First chunk received
    Success,
}

/// One unit of the orchestrator's output protocol
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    /// The routing decision, always the first event
    Routing(RoutingDecision),

    /// A provider is being tried, or has started producing output
    ProviderAttempt {
        /// Provider id
        provider: String,
        /// Model in use
        model: String,
        /// Attempt status
        status: AttemptStatus,
    },

    /// A chunk of generated text
    Content {
        /// Chunk text
        text: String,
    },

    /// A provider failed
    ProviderError {
        /// Provider id
        provider: String,
        /// Error message
        error: String,
        /// Whether the next provider will be tried
        will_fallback: bool,
    },

    /// A provider finished its response (terminal)
    Complete {
        /// Provider id
        provider: String,
        /// Model in use
        model: String,
        /// Wall time of the attempt, two decimals
        elapsed_seconds: f64,
        /// Provider usage after the request
        ///
        /// Counters are shared by every request on the provider. `model` is
        /// the model this attempt used.
        stats: ProviderStats,
    },

    /// No provider could answer (terminal)
    Fatal {
        /// Error message
        error: String,
        /// Providers that were in the fallback order
        attempted_providers: Vec<String>,
    },
}

impl StreamEvent {
    /// Whether this event ends the stream
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Fatal { .. })
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Runs routing decisions against the provider registry
#[derive(Debug, Clone)]
pub struct FallbackOrchestrator {
    registry: Arc<ProviderRegistry>,
    streaming: bool,
    max_tokens: u32,
}

impl FallbackOrchestrator {
    /// Create an orchestrator that requests streamed responses
    #[must_use]
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self {
            registry,
            streaming: true,
            max_tokens: 4096,
        }
    }

    /// Request streamed or whole responses from providers
    #[must_use]
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    /// Set the response token limit passed to providers
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Run a decision, producing its event stream
    pub fn run(&self, query: &str, decision: RoutingDecision) -> EventStream {
        let span = tracing::info_span!("route", request_id = %uuid::Uuid::new_v4());
        let state = RunState {
            registry: Arc::clone(&self.registry),
            prompt: query.to_string(),
            streaming: self.streaming,
            max_tokens: self.max_tokens,
            order: decision.fallback_order.clone(),
            next: 0,
            selected: decision
                .selected_provider
                .clone()
                .zip(decision.selected_model.clone()),
            pending: VecDeque::new(),
            phase: Phase::Decided(Box::new(decision)),
            span,
        };

        futures::stream::unfold(state, RunState::step).boxed()
    }
}

enum Phase {
    Decided(Box<RoutingDecision>),
    NextProvider,
    Connecting {
        provider: String,
        model: String,
        adapter: Arc<dyn ProviderAdapter>,
        started: Instant,
    },
    Streaming(Attempt),
    Finished,
}

struct Attempt {
    provider: String,
    model: String,
    adapter: Arc<dyn ProviderAdapter>,
    chunks: ChunkStream,
    started: Instant,
    announced: bool,
}

struct RunState {
    registry: Arc<ProviderRegistry>,
    prompt: String,
    streaming: bool,
    max_tokens: u32,
    order: Vec<String>,
    next: usize,
    selected: Option<(String, String)>,
    pending: VecDeque<StreamEvent>,
    phase: Phase,
    span: tracing::Span,
}

impl RunState {
    fn step(self) -> impl Future<Output = Option<(StreamEvent, Self)>> + Send {
        let span = self.span.clone();
        self.advance().instrument(span)
    }

    async fn advance(mut self) -> Option<(StreamEvent, Self)> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some((event, self));
            }

            match std::mem::replace(&mut self.phase, Phase::Finished) {
                Phase::Decided(decision) => {
                    let decision = *decision;
                    let nothing_to_try = decision.fallback_order.is_empty();
                    self.pending.push_back(StreamEvent::Routing(decision));
                    if nothing_to_try {
                        warn!("No providers available for query");
                        self.pending.push_back(StreamEvent::Fatal {
                            error: FATAL_NO_PROVIDERS.to_string(),
                            attempted_providers: Vec::new(),
                        });
                    } else {
                        self.phase = Phase::NextProvider;
                    }
                }
                Phase::NextProvider => self.next_provider(),
                Phase::Connecting {
                    provider,
                    model,
                    adapter,
                    started,
                } => self.connect(provider, model, adapter, started).await,
                Phase::Streaming(attempt) => self.pull(attempt).await,
                Phase::Finished => return None,
            }
        }
    }

    fn next_provider(&mut self) {
        while let Some(provider) = self.order.get(self.next).cloned() {
            self.next += 1;

            let Some(adapter) = self.registry.get(&provider).cloned() else {
                warn!(provider = %provider, "Provider in fallback order is not registered, skipping");
                continue;
            };

            let model = match &self.selected {
                Some((selected, model)) if *selected == provider => {
                    if adapter.current_model() != *model {
                        adapter.set_model(model);
                    }
                    model.clone()
                }
                _ => adapter.current_model(),
            };

            info!(provider = %provider, model = %model, "Attempting provider");
            self.pending.push_back(StreamEvent::ProviderAttempt {
                provider: provider.clone(),
                model: model.clone(),
                status: AttemptStatus::Attempting,
            });
            self.phase = Phase::Connecting {
                provider,
                model,
                adapter,
                started: Instant::now(),
            };
            return;
        }

        warn!(attempted = ?self.order, "All providers failed");
        self.pending.push_back(StreamEvent::Fatal {
            error: FATAL_ALL_FAILED.to_string(),
            attempted_providers: self.order.clone(),
        });
    }

    async fn connect(
        &mut self,
        provider: String,
        model: String,
        adapter: Arc<dyn ProviderAdapter>,
        started: Instant,
    ) {
        let request = CompletionRequest::new(self.prompt.clone(), model.clone())
            .with_stream(self.streaming)
            .with_max_tokens(self.max_tokens);

        match adapter.query(&request).await {
            Ok(chunks) => {
                self.phase = Phase::Streaming(Attempt {
                    provider,
                    model,
                    adapter,
                    chunks,
                    started,
                    announced: false,
                });
            }
            Err(e) => self.fail(provider, &e),
        }
    }

    async fn pull(&mut self, mut attempt: Attempt) {
        match attempt.chunks.next().await {
            Some(Ok(text)) => {
                if !attempt.announced {
                    attempt.announced = true;
                    self.pending.push_back(StreamEvent::ProviderAttempt {
                        provider: attempt.provider.clone(),
                        model: attempt.model.clone(),
                        status: AttemptStatus::Success,
                    });
                }
                self.pending.push_back(StreamEvent::Content { text });
                self.phase = Phase::Streaming(attempt);
            }
            Some(Err(e)) => self.fail(attempt.provider, &e),
            None => {
                let elapsed = attempt.started.elapsed().as_secs_f64();
                let elapsed_seconds = (elapsed * 100.0).round() / 100.0;
                info!(
                    provider = %attempt.provider,
                    model = %attempt.model,
                    elapsed_seconds,
                    "Provider completed"
                );
                // another request may have moved the adapter's model since
                let stats = ProviderStats {
                    model: attempt.model.clone(),
                    ..attempt.adapter.snapshot_stats()
                };
                self.pending.push_back(StreamEvent::Complete {
                    stats,
                    provider: attempt.provider,
                    model: attempt.model,
                    elapsed_seconds,
                });
            }
        }
    }

    fn fail(&mut self, provider: String, error: &BackendError) {
        warn!(provider = %provider, error = %error, "Provider failed, falling back");
        self.pending.push_back(StreamEvent::ProviderError {
            provider,
            error: error.to_string(),
            will_fallback: true,
        });
        self.phase = Phase::NextProvider;
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::analyzer::QueryAnalyzer;

    fn decision(order: &[&str]) -> RoutingDecision {
        RoutingDecision {
            selected_provider: order.first().map(|p| (*p).to_string()),
            selected_model: order.first().map(|_| "m".to_string()),
            reason: "test".to_string(),
            query_metadata: QueryAnalyzer::analyze("hi"),
            fallback_order: order.iter().map(|p| (*p).to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_empty_order_is_fatal() {
        let orchestrator = FallbackOrchestrator::new(Arc::new(ProviderRegistry::default()));
        let events: Vec<_> = orchestrator.run("hi", decision(&[])).collect().await;

        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], StreamEvent::Routing(_)));
        assert_eq!(
            events[1],
            StreamEvent::Fatal {
                error: FATAL_NO_PROVIDERS.to_string(),
                attempted_providers: Vec::new(),
            }
        );
    }

    #[tokio::test]
    async fn test_unregistered_providers_are_skipped() {
        let orchestrator = FallbackOrchestrator::new(Arc::new(ProviderRegistry::default()));
        let events: Vec<_> = orchestrator
            .run("hi", decision(&["ghost", "phantom"]))
            .collect()
            .await;

        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1],
            StreamEvent::Fatal {
                error: FATAL_ALL_FAILED.to_string(),
                attempted_providers: vec!["ghost".to_string(), "phantom".to_string()],
            }
        );
    }

    #[test]
    fn test_event_wire_format() {
        let event = StreamEvent::ProviderAttempt {
            provider: "openai".to_string(),
            model: "gpt-4".to_string(),
            status: AttemptStatus::Attempting,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "provider_attempt",
                "data": {"provider": "openai", "model": "gpt-4", "status": "attempting"}
            })
        );

        let content = serde_json::to_value(StreamEvent::Content {
            text: "hi".to_string(),
        })
        .unwrap();
        assert_eq!(content["type"], "content");
        assert_eq!(content["data"]["text"], "hi");
    }

    #[test]
    fn test_terminal_events() {
        assert!(StreamEvent::Fatal {
            error: String::new(),
            attempted_providers: Vec::new()
        }
        .is_terminal());
        assert!(!StreamEvent::Content {
            text: String::new()
        }
        .is_terminal());
    }
}

//! Usage and cost accounting for a single provider.
//!
//! Counters only ever grow. A request is counted once when it finishes, either
//! as a success (tokens and cost added) or as an error, which keeps
//! `error_count <= request_count` under any interleaving of concurrent
//! requests.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Snapshot of a provider's usage counters
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderStats {
    /// Provider id
    pub provider_id: String,
    /// Model active when the snapshot was taken
    pub model: String,
    /// Input plus output tokens across successful requests
    pub total_tokens: u64,
    /// Estimated spend in USD
    pub total_cost: f64,
    /// Finished requests, successful or not
    pub request_count: u64,
    /// Failed requests
    pub error_count: u64,
}

impl ProviderStats {
    /// Zeroed counters for a provider that never served a request
    pub fn empty(provider_id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            model: model.into(),
            ..Default::default()
        }
    }

    /// Fraction of failed requests
    #[must_use]
    pub fn error_rate(&self) -> f64 {
        self.error_count as f64 / self.request_count.max(1) as f64
    }
}

#[derive(Debug, Default)]
struct Counters {
    total_tokens: u64,
    total_cost: f64,
    request_count: u64,
    error_count: u64,
}

/// Thread-safe usage counters shared by an adapter and its in-flight streams
#[derive(Debug, Default)]
pub struct UsageTracker {
    counters: Mutex<Counters>,
}

impl UsageTracker {
    /// Create a tracker with zeroed counters
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed request
    pub fn record_success(&self, tokens: u64, cost: f64) {
        let mut c = self.counters.lock();
        c.request_count += 1;
        c.total_tokens += tokens;
        c.total_cost += cost.max(0.0);
    }

    /// Record a failed request
    pub fn record_failure(&self) {
        let mut c = self.counters.lock();
        c.request_count += 1;
        c.error_count += 1;
    }

    /// Copy the counters into a [`ProviderStats`]
    pub fn snapshot(&self, provider_id: &str, model: &str) -> ProviderStats {
        let c = self.counters.lock();
        ProviderStats {
            provider_id: provider_id.to_string(),
            model: model.to_string(),
            total_tokens: c.total_tokens,
            total_cost: c.total_cost,
            request_count: c.request_count,
            error_count: c.error_count,
        }
    }
}

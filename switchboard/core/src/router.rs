//! Router
//!
//! The caller-facing entry point. A [`Router`] is built once at startup from a
//! rule set and a provider registry and then shared (it is cheap to clone).
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                          Router                           │
//! │  ┌──────────────┐   ┌───────────────┐   ┌──────────────┐  │
//! │  │ RoutingRules │──►│ RoutingEngine │──►│   Fallback   │  │
//! │  └──────────────┘   └───────┬───────┘   │ Orchestrator │  │
//! │                             │           └──────┬───────┘  │
//! │                     ┌───────▼──────────────────▼───────┐  │
//! │                     │        ProviderRegistry          │  │
//! │                     └──────────────────────────────────┘  │
//! └───────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::backend::build_registry;
use crate::config::{load_rule_set, Settings};
use crate::provider::{ProviderRegistry, ProviderReport};
use crate::routing::{
    EventStream, FallbackOrchestrator, RouteError, RoutingDecision, RoutingEngine, RoutingRuleSet,
};

/// Routes queries to providers and streams their responses
#[derive(Debug, Clone)]
pub struct Router {
    rules: Arc<RoutingRuleSet>,
    registry: Arc<ProviderRegistry>,
    engine: RoutingEngine,
    orchestrator: FallbackOrchestrator,
}

impl Router {
    /// Create a router over a rule set and registry, streaming responses
    #[must_use]
    pub fn new(rules: RoutingRuleSet, registry: ProviderRegistry) -> Self {
        let rules = Arc::new(rules);
        let registry = Arc::new(registry);
        Self {
            engine: RoutingEngine::new(Arc::clone(&rules), Arc::clone(&registry)),
            orchestrator: FallbackOrchestrator::new(Arc::clone(&registry)),
            rules,
            registry,
        }
    }

    /// Create a router from loaded settings
    ///
    /// Loads the rule source (falling back to the built-in rules) and builds
    /// an adapter for every provider with a key.
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        let rules = load_rule_set(&settings.rules_file);
        let registry = build_registry(settings);
        Self::new(rules, registry).with_streaming(settings.streaming)
    }

    /// Request streamed or whole responses from providers
    #[must_use]
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.orchestrator = self.orchestrator.with_streaming(streaming);
        self
    }

    /// Set the response token limit sent to providers
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.orchestrator = self.orchestrator.with_max_tokens(max_tokens);
        self
    }

    /// Route a query without running it
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::InvalidInput`] for an empty query.
    pub fn decide(
        &self,
        query: &str,
        preference: Option<&str>,
    ) -> Result<RoutingDecision, RouteError> {
        self.engine.decide(query, preference)
    }

    /// Route a query and stream the outcome
    ///
    /// The stream starts with the routing decision and ends with exactly one
    /// `Complete` or `Fatal` event. Dropping it cancels the request.
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::InvalidInput`] for an empty query. No provider is
    /// contacted in that case.
    pub fn query(&self, query: &str, preference: Option<&str>) -> Result<EventStream, RouteError> {
        let decision = self.engine.decide(query, preference)?;
        Ok(self.orchestrator.run(query, decision))
    }

    /// Usage report for every known provider, available or not
    #[must_use]
    pub fn list_provider_stats(&self) -> Vec<ProviderReport> {
        self.registry.report()
    }

    /// Ids of providers that can receive requests
    #[must_use]
    pub fn available_providers(&self) -> Vec<String> {
        self.registry.available_ids().map(str::to_string).collect()
    }

    /// Probe every known provider
    ///
    /// Probes run concurrently. Unavailable providers, and probes that panic,
    /// report `false`.
    pub async fn health_check_all(&self) -> BTreeMap<String, bool> {
        let probes: Vec<_> = self
            .registry
            .adapters()
            .map(|(id, adapter)| {
                let adapter = Arc::clone(adapter);
                (
                    id.to_string(),
                    tokio::spawn(async move { adapter.health_check().await }),
                )
            })
            .collect();

        let mut results: BTreeMap<String, bool> = self
            .registry
            .statuses()
            .iter()
            .map(|s| (s.provider_id.clone(), false))
            .collect();

        for (id, probe) in probes {
            let healthy = probe.await.unwrap_or_else(|e| {
                tracing::warn!(provider = %id, error = %e, "Health check aborted");
                false
            });
            results.insert(id, healthy);
        }
        results
    }

    /// Rule set in use
    #[must_use]
    pub fn current_rule_set(&self) -> &RoutingRuleSet {
        &self.rules
    }
}

//! Provider Registry
//!
//! Tracks every provider known to the process, whether it could be set up, and
//! the adapter for each one that could. The registry is built once at startup
//! and is read-only afterwards, so it is shared behind an `Arc` without locks.
//!
//! Iteration order is registration order. The factory registers the known
//! providers in the fixed order `openai`, `anthropic`, `google`, which is the
//! "registry order" used by the routing engine when it has to pick the first
//! available provider.

use std::sync::Arc;

use serde::Serialize;

use super::stats::ProviderStats;
use super::traits::ProviderAdapter;

/// Provider ids the service knows how to configure, in registry order
pub const KNOWN_PROVIDERS: [&str; 3] = ["openai", "anthropic", "google"];

/// Startup status of a provider
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProviderStatus {
    /// Provider id
    pub provider_id: String,
    /// Whether an adapter was constructed
    pub configured: bool,
    /// Model configured at startup
    pub model: String,
    /// Why the provider is unusable, if it is
    pub init_error: Option<String>,
}

/// Per-provider entry of the stats listing
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProviderReport {
    /// Usage counters (zeroed for unavailable providers)
    #[serde(flatten)]
    pub stats: ProviderStats,
    /// Whether the provider can receive requests
    pub available: bool,
    /// Initialization error, if any
    pub error: Option<String>,
    /// `error_count / max(request_count, 1)`, two decimals
    pub error_rate: f64,
}

impl ProviderReport {
    fn new(stats: ProviderStats, available: bool, error: Option<String>) -> Self {
        let error_rate = round_to(stats.error_rate(), 2);
        let stats = ProviderStats {
            total_cost: round_to(stats.total_cost, 4),
            ..stats
        };
        Self {
            stats,
            available,
            error,
            error_rate,
        }
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Registry of configured provider adapters
#[derive(Default)]
pub struct ProviderRegistry {
    statuses: Vec<ProviderStatus>,
    adapters: Vec<(String, Arc<dyn ProviderAdapter>)>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("statuses", &self.statuses)
            .field("available", &self.available_ids().collect::<Vec<_>>())
            .finish()
    }
}

impl ProviderRegistry {
    /// Start building a registry
    #[must_use]
    pub fn builder() -> ProviderRegistryBuilder {
        ProviderRegistryBuilder::default()
    }

    /// Adapter for a provider, if it is available
    #[must_use]
    pub fn get(&self, provider_id: &str) -> Option<&Arc<dyn ProviderAdapter>> {
        self.adapters
            .iter()
            .find(|(id, _)| id == provider_id)
            .map(|(_, adapter)| adapter)
    }

    /// Whether a provider can receive requests
    #[must_use]
    pub fn is_available(&self, provider_id: &str) -> bool {
        self.get(provider_id).is_some()
    }

    /// Ids of available providers, in registry order
    pub fn available_ids(&self) -> impl Iterator<Item = &str> {
        self.adapters.iter().map(|(id, _)| id.as_str())
    }

    /// Available adapters, in registry order
    pub fn adapters(&self) -> impl Iterator<Item = (&str, &Arc<dyn ProviderAdapter>)> {
        self.adapters.iter().map(|(id, adapter)| (id.as_str(), adapter))
    }

    /// Whether no provider is available at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Startup status of every known provider
    #[must_use]
    pub fn statuses(&self) -> &[ProviderStatus] {
        &self.statuses
    }

    /// Startup status of one provider
    #[must_use]
    pub fn status(&self, provider_id: &str) -> Option<&ProviderStatus> {
        self.statuses.iter().find(|s| s.provider_id == provider_id)
    }

    /// Stats report for every known provider, available or not
    #[must_use]
    pub fn report(&self) -> Vec<ProviderReport> {
        self.statuses
            .iter()
            .map(|status| match self.get(&status.provider_id) {
                Some(adapter) => ProviderReport::new(adapter.snapshot_stats(), true, None),
                None => ProviderReport::new(
                    ProviderStats::empty(&status.provider_id, &status.model),
                    false,
                    status.init_error.clone(),
                ),
            })
            .collect()
    }
}

/// Builder for [`ProviderRegistry`]
#[derive(Default)]
pub struct ProviderRegistryBuilder {
    registry: ProviderRegistry,
}

impl ProviderRegistryBuilder {
    /// Register an initialized adapter
    #[must_use]
    pub fn with_adapter(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        let id = adapter.id().to_string();
        self.set_status(ProviderStatus {
            provider_id: id.clone(),
            configured: true,
            model: adapter.current_model(),
            init_error: None,
        });

        match self.registry.adapters.iter_mut().find(|(existing, _)| *existing == id) {
            Some(slot) => slot.1 = adapter,
            None => self.registry.adapters.push((id, adapter)),
        }
        self
    }

    /// Record a provider that exists in configuration but cannot be used
    #[must_use]
    pub fn with_unavailable(
        mut self,
        provider_id: impl Into<String>,
        model: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        let provider_id = provider_id.into();
        self.registry.adapters.retain(|(id, _)| *id != provider_id);
        self.set_status(ProviderStatus {
            provider_id,
            configured: false,
            model: model.into(),
            init_error: Some(error.into()),
        });
        self
    }

    fn set_status(&mut self, status: ProviderStatus) {
        match self
            .registry
            .statuses
            .iter_mut()
            .find(|s| s.provider_id == status.provider_id)
        {
            Some(slot) => *slot = status,
            None => self.registry.statuses.push(status),
        }
    }

    /// Finish building
    #[must_use]
    pub fn build(self) -> ProviderRegistry {
        self.registry
    }
}

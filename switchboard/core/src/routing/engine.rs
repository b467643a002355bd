//! Routing Engine
//!
//! Combines query analysis with the rule set to pick a provider and model, and
//! computes the order in which providers are tried.
//!
//! # Decision Flow
//!
//! ```text
//! 1. Analyze the query
//! 2. Honour the caller's provider preference if that provider is available
//! 3. Otherwise: first matching rule with an available provider
//!    -> default provider/model -> first available provider -> none
//! 4. Build the fallback order:
//!    openai (if available and not selected), selected, configured
//!    fallback_order, then every available provider if still empty
//! ```

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use super::rules::{select_rule, RoutingRuleSet};
use crate::analyzer::{QueryAnalyzer, QueryMetadata};
use crate::provider::ProviderRegistry;

/// Provider that is always tried first when available
pub const PREFERRED_FIRST_PROVIDER: &str = "openai";

/// Reason reported for an honoured caller preference
pub const REASON_USER_PREFERENCE: &str = "user preference";
/// Reason reported when the configured default is used
pub const REASON_DEFAULT: &str = "default routing";
/// Reason reported when nothing else applied
pub const REASON_FIRST_AVAILABLE: &str = "first available provider";
/// Reason reported when no provider can be used
pub const REASON_NONE_AVAILABLE: &str = "no providers available";

/// Errors returned before any provider is touched
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    /// The query was empty
    #[error("Query is required")]
    InvalidInput,
}

/// The outcome of routing a single query
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RoutingDecision {
    /// Selected provider, `None` when nothing is available
    pub selected_provider: Option<String>,
    /// Selected model, `None` when nothing is available
    pub selected_model: Option<String>,
    /// Why this provider was selected
    pub reason: String,
    /// Classification of the query
    pub query_metadata: QueryMetadata,
    /// Providers to try, in order, without duplicates
    pub fallback_order: Vec<String>,
}

/// Routing engine over a fixed rule set and registry
#[derive(Debug, Clone)]
pub struct RoutingEngine {
    rules: Arc<RoutingRuleSet>,
    registry: Arc<ProviderRegistry>,
}

impl RoutingEngine {
    /// Create an engine
    #[must_use]
    pub fn new(rules: Arc<RoutingRuleSet>, registry: Arc<ProviderRegistry>) -> Self {
        Self { rules, registry }
    }

    /// Route a query
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::InvalidInput`] if the query is empty or only
    /// whitespace.
    pub fn decide(
        &self,
        query: &str,
        preference: Option<&str>,
    ) -> Result<RoutingDecision, RouteError> {
        if query.trim().is_empty() {
            return Err(RouteError::InvalidInput);
        }

        let query_metadata = QueryAnalyzer::analyze(query);
        let (selected, reason) = match self.preferred(preference) {
            Some(choice) => (Some(choice), REASON_USER_PREFERENCE.to_string()),
            None => self.apply_rules(&query_metadata),
        };

        let (selected_provider, selected_model) = match selected {
            Some((provider, model)) => (Some(provider), Some(model)),
            None => (None, None),
        };
        let fallback_order = self.fallback_order(selected_provider.as_deref());

        tracing::debug!(
            provider = ?selected_provider,
            model = ?selected_model,
            reason = %reason,
            query_type = %query_metadata.query_type,
            fallback = ?fallback_order,
            "Routing decision"
        );

        Ok(RoutingDecision {
            selected_provider,
            selected_model,
            reason,
            query_metadata,
            fallback_order,
        })
    }

    fn preferred(&self, preference: Option<&str>) -> Option<(String, String)> {
        let provider = preference.filter(|p| !p.is_empty())?;
        let adapter = self.registry.get(provider)?;
        Some((provider.to_string(), adapter.current_model()))
    }

    fn apply_rules(&self, metadata: &QueryMetadata) -> (Option<(String, String)>, String) {
        if let Some(rule) = select_rule(&self.rules, metadata, |p| self.registry.is_available(p))
        {
            return (
                Some((rule.provider.clone(), rule.model.clone())),
                rule.reason().to_string(),
            );
        }

        if self.registry.is_available(&self.rules.default_provider) {
            return (
                Some((
                    self.rules.default_provider.clone(),
                    self.rules.default_model.clone(),
                )),
                REASON_DEFAULT.to_string(),
            );
        }

        if let Some((id, adapter)) = self.registry.adapters().next() {
            return (
                Some((id.to_string(), adapter.current_model())),
                REASON_FIRST_AVAILABLE.to_string(),
            );
        }

        (None, REASON_NONE_AVAILABLE.to_string())
    }

    /// Order in which providers are attempted for a given selection
    #[must_use]
    pub fn fallback_order(&self, selected: Option<&str>) -> Vec<String> {
        let mut order: Vec<String> = Vec::new();
        let push = |order: &mut Vec<String>, id: &str| {
            if self.registry.is_available(id) && !order.iter().any(|o| o == id) {
                order.push(id.to_string());
            }
        };

        if selected != Some(PREFERRED_FIRST_PROVIDER) {
            push(&mut order, PREFERRED_FIRST_PROVIDER);
        }
        if let Some(selected) = selected {
            push(&mut order, selected);
        }
        for id in &self.rules.fallback_order {
            push(&mut order, id);
        }
        if order.is_empty() {
            for id in self.registry.available_ids() {
                push(&mut order, id);
            }
        }
        order
    }
}

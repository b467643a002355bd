//! Registry Factory
//!
//! Builds the provider registry from loaded settings. This keeps vendor
//! construction out of the router, which only ever sees
//! [`ProviderAdapter`](crate::provider::ProviderAdapter) trait objects.

use std::sync::Arc;

use super::anthropic::AnthropicAdapter;
use super::google::GoogleAdapter;
use super::http::AdapterConfig;
use super::openai::OpenAiAdapter;
use crate::config::{ProviderSettings, Settings};
use crate::provider::{BackendError, ProviderAdapter, ProviderRegistry};

/// Initialization error recorded for providers without a key
pub const NOT_CONFIGURED: &str = "API key not configured";

/// Create the provider registry described by the settings
///
/// Every known provider gets a status entry, in the order openai, anthropic,
/// google. Providers with a key get an adapter. The others, and any whose
/// client fails to build, are recorded as unavailable with the reason.
///
/// # Example
///
/// ```ignore
/// use switchboard_core::backend::build_registry;
/// use switchboard_core::config::load_settings;
///
/// let settings = load_settings()?;
/// let registry = build_registry(&settings);
/// ```
#[must_use]
pub fn build_registry(settings: &Settings) -> ProviderRegistry {
    let mut builder = ProviderRegistry::builder();

    for provider in settings.providers() {
        let Some(config) = adapter_config(provider, settings) else {
            tracing::info!(provider = provider.id, "Provider not configured");
            builder = builder.with_unavailable(provider.id, &provider.model, NOT_CONFIGURED);
            continue;
        };

        match create_adapter(provider.id, config) {
            Ok(adapter) => {
                tracing::info!(provider = provider.id, model = %provider.model, "Provider initialized");
                builder = builder.with_adapter(adapter);
            }
            Err(e) => {
                tracing::warn!(provider = provider.id, error = %e, "Provider failed to initialize");
                builder = builder.with_unavailable(provider.id, &provider.model, e.to_string());
            }
        }
    }

    builder.build()
}

fn adapter_config(provider: &ProviderSettings, settings: &Settings) -> Option<AdapterConfig> {
    let key = provider.api_key.as_deref().filter(|k| !k.is_empty())?;
    let mut config =
        AdapterConfig::new(key, provider.model.as_str()).with_timeout(settings.request_timeout);
    if let Some(ref base_url) = provider.base_url {
        config = config.with_base_url(base_url.as_str());
    }
    Some(config)
}

/// Create one adapter by provider id
///
/// # Errors
///
/// Returns [`BackendError::NotConfigured`] for an unknown id or if the HTTP
/// client cannot be built.
pub fn create_adapter(
    provider_id: &str,
    config: AdapterConfig,
) -> Result<Arc<dyn ProviderAdapter>, BackendError> {
    match provider_id {
        "openai" => Ok(Arc::new(OpenAiAdapter::new(config)?)),
        "anthropic" => Ok(Arc::new(AnthropicAdapter::new(config)?)),
        "google" => Ok(Arc::new(GoogleAdapter::new(config)?)),
        other => Err(BackendError::NotConfigured(format!(
            "unknown provider '{other}'"
        ))),
    }
}

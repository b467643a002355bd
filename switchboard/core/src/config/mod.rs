//! TOML Configuration File Support
//!
//! Centralized configuration loading for Switchboard, from an optional TOML
//! file at `~/.config/switchboard/switchboard.toml`, the environment and the
//! command line. The routing rule source is a separate JSON (or TOML) file
//! named by the settings.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments ([`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! API keys are only read from the environment.
//!
//! # Example Configuration
//!
//! ```toml
//! [routing]
//! rules_file = "/etc/switchboard/routing_rules.json"
//! streaming = true
//!
//! [providers]
//! request_timeout_secs = 30
//! openai_model = "gpt-4"
//! anthropic_model = "claude-3-sonnet-20240229"
//! google_model = "gemini-2.5-flash"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::routing::RoutingRuleSet;

/// Rule source looked up in the working directory when none is configured
pub const DEFAULT_RULES_FILE: &str = "routing_rules.json";

/// Default request timeout in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Failed to parse a JSON rule source
    #[error("Failed to parse routing rules at {path}: {source}")]
    RulesJson {
        /// The rule source
        path: PathBuf,
        /// The underlying JSON error
        source: serde_json::Error,
    },

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Routing section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingToml {
    /// Path to the routing rule source
    pub rules_file: Option<String>,

    /// Whether providers stream their responses
    pub streaming: Option<bool>,
}

/// Providers section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersToml {
    /// Request timeout in seconds
    pub request_timeout_secs: Option<u64>,

    /// Initial OpenAI model
    pub openai_model: Option<String>,

    /// Initial Anthropic model
    pub anthropic_model: Option<String>,

    /// Initial Google model
    pub google_model: Option<String>,

    /// OpenAI API host override
    pub openai_base_url: Option<String>,

    /// Anthropic API host override
    pub anthropic_base_url: Option<String>,

    /// Google API host override
    pub google_base_url: Option<String>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchboardToml {
    /// Routing configuration section
    pub routing: RoutingToml,

    /// Provider configuration section
    pub providers: ProvidersToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Settings for one vendor
#[derive(Clone)]
pub struct ProviderSettings {
    /// Provider id
    pub id: &'static str,
    /// API key, `None` when not configured
    pub api_key: Option<String>,
    /// Initial model
    pub model: String,
    /// API host override
    pub base_url: Option<String>,
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("id", &self.id)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl ProviderSettings {
    fn new(id: &'static str, model: &str) -> Self {
        Self {
            id,
            api_key: None,
            model: model.to_string(),
            base_url: None,
        }
    }

    /// Whether a non-empty key is present
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }
}

/// Centralized configuration for Switchboard
///
/// Use [`load_settings`] to load it with proper priority handling.
#[derive(Clone, Debug)]
pub struct Settings {
    /// Rule source path
    pub rules_file: PathBuf,

    /// Whether providers stream their responses
    pub streaming: bool,

    /// Connect timeout, and total timeout for non-streaming calls
    pub request_timeout: Duration,

    /// OpenAI settings
    pub openai: ProviderSettings,

    /// Anthropic settings
    pub anthropic: ProviderSettings,

    /// Google settings
    pub google: ProviderSettings,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    source: ConfigSource,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rules_file: PathBuf::from(DEFAULT_RULES_FILE),
            streaming: true,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            openai: ProviderSettings::new("openai", "gpt-4"),
            anthropic: ProviderSettings::new("anthropic", "claude-3-sonnet-20240229"),
            google: ProviderSettings::new("google", "gemini-2.5-flash"),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

/// Key format expectations used by [`Settings::validate`]
struct KeyRule {
    env_var: &'static str,
    prefix: &'static str,
    placeholder: &'static str,
}

const OPENAI_KEY: KeyRule = KeyRule {
    env_var: "OPENAI_API_KEY",
    prefix: "sk-",
    placeholder: "your_openai_api_key_here",
};
const ANTHROPIC_KEY: KeyRule = KeyRule {
    env_var: "ANTHROPIC_API_KEY",
    prefix: "sk-ant-",
    placeholder: "your_anthropic_api_key_here",
};
const GOOGLE_KEY: KeyRule = KeyRule {
    env_var: "GOOGLE_API_KEY",
    prefix: "AIzaSy",
    placeholder: "your_google_api_key_here",
};

impl Settings {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Provider settings in registry order
    #[must_use]
    pub fn providers(&self) -> [&ProviderSettings; 3] {
        [&self.openai, &self.anthropic, &self.google]
    }

    /// Ids of providers with a key
    #[must_use]
    pub fn configured_providers(&self) -> Vec<&'static str> {
        self.providers()
            .into_iter()
            .filter(|p| p.is_configured())
            .map(|p| p.id)
            .collect()
    }

    /// Check the API keys and describe anything suspicious
    ///
    /// Never fails: a warning does not stop a provider from being registered.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let mut usable = 0;

        for (provider, rule) in [
            (&self.openai, OPENAI_KEY),
            (&self.anthropic, ANTHROPIC_KEY),
            (&self.google, GOOGLE_KEY),
        ] {
            match provider.api_key.as_deref() {
                None | Some("") => {
                    warnings.push(format!("{}: {} is not set", provider.id, rule.env_var));
                }
                Some(key) if key == rule.placeholder => warnings.push(format!(
                    "{}: {} still holds the sample placeholder",
                    provider.id, rule.env_var
                )),
                Some(key) if !key.starts_with(rule.prefix) => {
                    usable += 1;
                    warnings.push(format!(
                        "{}: {} should start with '{}'",
                        provider.id, rule.env_var, rule.prefix
                    ));
                }
                Some(_) => usable += 1,
            }
        }

        if usable == 0 {
            warnings.push("no API keys configured, every query will fail".to_string());
        }
        warnings
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/switchboard/switchboard.toml` or
/// `~/.config/switchboard/switchboard.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("switchboard").join("switchboard.toml"))
}

/// Load configuration from the default path and the environment
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed.
/// A missing config file is not an error (defaults are used).
pub fn load_settings() -> Result<Settings, ConfigError> {
    load_settings_from_path(default_config_path())
}

/// Load configuration from a specific path and the environment
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed,
/// or holds an invalid value.
pub fn load_settings_from_path(path: Option<PathBuf>) -> Result<Settings, ConfigError> {
    load_with_env(path, |name| std::env::var(name).ok())
}

fn load_with_env<E>(path: Option<PathBuf>, env: E) -> Result<Settings, ConfigError>
where
    E: Fn(&str) -> Option<String>,
{
    let mut settings = Settings::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: SwitchboardToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut settings, &toml_config)?;
            settings.config_file_path = Some(config_path.clone());
            settings.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut settings, env);

    Ok(settings)
}

/// Apply TOML configuration values to the settings
fn apply_toml_config(settings: &mut Settings, toml: &SwitchboardToml) -> Result<(), ConfigError> {
    if let Some(ref rules_file) = toml.routing.rules_file {
        settings.rules_file = PathBuf::from(rules_file);
    }
    if let Some(streaming) = toml.routing.streaming {
        settings.streaming = streaming;
    }

    if let Some(secs) = toml.providers.request_timeout_secs {
        if secs == 0 {
            return Err(ConfigError::ValidationError(
                "providers.request_timeout_secs must be greater than 0".to_string(),
            ));
        }
        settings.request_timeout = Duration::from_secs(secs);
    }

    let vendors = [
        (
            &mut settings.openai,
            &toml.providers.openai_model,
            &toml.providers.openai_base_url,
        ),
        (
            &mut settings.anthropic,
            &toml.providers.anthropic_model,
            &toml.providers.anthropic_base_url,
        ),
        (
            &mut settings.google,
            &toml.providers.google_model,
            &toml.providers.google_base_url,
        ),
    ];
    for (provider, model, base_url) in vendors {
        if let Some(model) = model {
            provider.model = model.clone();
        }
        if base_url.is_some() {
            provider.base_url = base_url.clone();
        }
    }

    Ok(())
}

/// Apply environment variable overrides to the settings
fn apply_env_config<E>(settings: &mut Settings, env: E)
where
    E: Fn(&str) -> Option<String>,
{
    for (provider, var) in [
        (&mut settings.openai, OPENAI_KEY.env_var),
        (&mut settings.anthropic, ANTHROPIC_KEY.env_var),
        (&mut settings.google, GOOGLE_KEY.env_var),
    ] {
        if let Some(key) = env(var).map(|k| k.trim().to_string()) {
            if !key.is_empty() {
                provider.api_key = Some(key);
            }
        }
    }

    if let Some(path) = env("SWITCHBOARD_RULES_FILE") {
        settings.rules_file = PathBuf::from(path);
        settings.source = ConfigSource::Env;
    }
    if let Some(timeout) = env("SWITCHBOARD_REQUEST_TIMEOUT") {
        match timeout.parse::<u64>() {
            Ok(secs) if secs > 0 => {
                settings.request_timeout = Duration::from_secs(secs);
                settings.source = ConfigSource::Env;
            }
            _ => tracing::warn!(value = %timeout, "Ignoring invalid SWITCHBOARD_REQUEST_TIMEOUT"),
        }
    }
    if let Some(streaming) = env("SWITCHBOARD_STREAMING") {
        settings.streaming = streaming != "0" && streaming.to_lowercase() != "false";
        settings.source = ConfigSource::Env;
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_settings`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Rule source override
    pub rules_file: Option<PathBuf>,

    /// Streaming override
    pub streaming: Option<bool>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set rule source override
    #[must_use]
    pub fn with_rules_file(mut self, path: PathBuf) -> Self {
        self.rules_file = Some(path);
        self
    }

    /// Set streaming override
    #[must_use]
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = Some(streaming);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, settings: &mut Settings) {
        if self.rules_file.is_some() || self.streaming.is_some() {
            settings.source = ConfigSource::Cli;
        }
        if let Some(ref path) = self.rules_file {
            settings.rules_file = path.clone();
        }
        if let Some(streaming) = self.streaming {
            settings.streaming = streaming;
        }
    }
}

// =============================================================================
// Rule Source Loading
// =============================================================================

/// Load a rule source, failing on any problem
///
/// The file is read as TOML when its extension is `.toml`, JSON otherwise.
///
/// # Errors
///
/// Returns an error if the file cannot be read, does not parse, or names a
/// rule without a provider or model.
pub fn try_load_rule_set(path: &Path) -> Result<RoutingRuleSet, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let rules = if is_toml {
        RoutingRuleSet::from_toml_str(&content)?
    } else {
        RoutingRuleSet::from_json_str(&content).map_err(|e| ConfigError::RulesJson {
            path: path.to_path_buf(),
            source: e,
        })?
    };

    if let Some(rule) = rules
        .rules
        .iter()
        .find(|r| r.provider.trim().is_empty() || r.model.trim().is_empty())
    {
        return Err(ConfigError::ValidationError(format!(
            "rule '{}' must name a provider and a model",
            rule.name
        )));
    }

    Ok(rules)
}

/// Load a rule source, falling back to the built-in rule set
///
/// Never fails: a missing or malformed source is logged and replaced by
/// [`RoutingRuleSet::default`].
#[must_use]
pub fn load_rule_set(path: &Path) -> RoutingRuleSet {
    match try_load_rule_set(path) {
        Ok(rules) => {
            tracing::info!(
                path = %path.display(),
                rules = rules.rules.len(),
                "Loaded routing rules"
            );
            rules
        }
        Err(ConfigError::ReadError { ref source, .. })
            if source.kind() == std::io::ErrorKind::NotFound =>
        {
            tracing::warn!(path = %path.display(), "Routing rules not found, using default rules");
            RoutingRuleSet::default()
        }
        Err(e) => {
            tracing::warn!(error = %e, "Routing rules unusable, using default rules");
            RoutingRuleSet::default()
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

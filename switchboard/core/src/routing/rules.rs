//! Routing Rules
//!
//! Declarative, prioritized rules mapping query metadata to a provider/model
//! pair. A rule set is loaded once at startup and never mutated afterwards.
//!
//! # Rule Source Format
//!
//! ```json
//! {
//!   "rules": [
//!     {
//!       "name": "code_queries",
//!       "priority": 1,
//!       "condition": { "query_type": "code" },
//!       "provider": "openai",
//!       "model": "gpt-4",
//!       "description": "Code queries go to GPT-4"
//!     }
//!   ],
//!   "fallback_order": ["openai", "anthropic", "google"],
//!   "default_provider": "openai",
//!   "default_model": "gpt-3.5-turbo"
//! }
//! ```
//!
//! # Matching
//!
//! Rules are evaluated in ascending `priority`; rules with equal priority keep
//! their source order. The first rule whose condition holds *and* whose
//! provider is available wins. A rule pointing at an unavailable provider is
//! skipped and the search continues with the next rule.

use serde::{Deserialize, Serialize};

use crate::analyzer::{Complexity, QueryMetadata, QueryType};

/// Priority assigned to rules that do not declare one
pub const DEFAULT_RULE_PRIORITY: i64 = 999;

fn default_priority() -> i64 {
    DEFAULT_RULE_PRIORITY
}

fn default_fallback_order() -> Vec<String> {
    vec![
        "openai".to_string(),
        "anthropic".to_string(),
        "google".to_string(),
    ]
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

// ============================================================================
// Rule Types
// ============================================================================

/// Conditions a query must satisfy for a rule to match
///
/// Absent fields always match. Token bounds are inclusive.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleCondition {
    /// Required query type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_type: Option<QueryType>,
    /// Minimum token estimate (inclusive)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_count_min: Option<usize>,
    /// Maximum token estimate (inclusive)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_count_max: Option<usize>,
    /// Required complexity
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complexity: Option<Complexity>,
}

impl RuleCondition {
    /// Check the condition against query metadata
    #[must_use]
    pub fn matches(&self, metadata: &QueryMetadata) -> bool {
        if self.query_type.is_some_and(|t| t != metadata.query_type) {
            return false;
        }
        if self
            .token_count_min
            .is_some_and(|min| metadata.token_count_estimate < min)
        {
            return false;
        }
        if self
            .token_count_max
            .is_some_and(|max| metadata.token_count_estimate > max)
        {
            return false;
        }
        if self.complexity.is_some_and(|c| c != metadata.complexity) {
            return false;
        }
        true
    }
}

/// A single routing rule
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingRule {
    /// Rule name
    pub name: String,
    /// Evaluation priority (lower is evaluated first)
    #[serde(default = "default_priority")]
    pub priority: i64,
    /// When the rule applies
    #[serde(default)]
    pub condition: RuleCondition,
    /// Target provider id
    pub provider: String,
    /// Target model
    pub model: String,
    /// Human-readable justification, reported as the routing reason
    #[serde(default)]
    pub description: String,
}

impl RoutingRule {
    /// Create a rule that matches everything
    pub fn new(
        name: impl Into<String>,
        priority: i64,
        provider: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            priority,
            condition: RuleCondition::default(),
            provider: provider.into(),
            model: model.into(),
            description: String::new(),
        }
    }

    /// Set the condition
    #[must_use]
    pub fn with_condition(mut self, condition: RuleCondition) -> Self {
        self.condition = condition;
        self
    }

    /// Set the description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Reason reported when this rule selects a provider
    #[must_use]
    pub fn reason(&self) -> &str {
        if self.description.is_empty() {
            &self.name
        } else {
            &self.description
        }
    }
}

/// The complete rule source
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingRuleSet {
    /// Rules, in source order
    #[serde(default)]
    pub rules: Vec<RoutingRule>,
    /// Provider preference used to extend the fallback order
    #[serde(default = "default_fallback_order")]
    pub fallback_order: Vec<String>,
    /// Provider used when no rule matches
    #[serde(default = "default_provider")]
    pub default_provider: String,
    /// Model used with the default provider
    #[serde(default = "default_model")]
    pub default_model: String,
    /// Advisory request timeout carried by the rule source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    /// Advisory retry count carried by the rule source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
}

impl Default for RoutingRuleSet {
    /// Built-in rule set used when the rule source is missing or malformed
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            fallback_order: default_fallback_order(),
            default_provider: default_provider(),
            default_model: default_model(),
            timeout_seconds: Some(30),
            max_retries: Some(3),
        }
    }
}

impl RoutingRuleSet {
    /// Parse a JSON rule source
    pub fn from_json_str(source: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(source)
    }

    /// Parse a TOML rule source
    pub fn from_toml_str(source: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(source)
    }

    /// Rules in evaluation order
    #[must_use]
    pub fn ordered_rules(&self) -> Vec<&RoutingRule> {
        let mut ordered: Vec<&RoutingRule> = self.rules.iter().collect();
        // stable: equal priorities keep source order
        ordered.sort_by_key(|rule| rule.priority);
        ordered
    }
}

// ============================================================================
// Matcher
// ============================================================================

/// Select the first rule that matches and targets an available provider
pub fn select_rule<'a, F>(
    rules: &'a RoutingRuleSet,
    metadata: &QueryMetadata,
    is_available: F,
) -> Option<&'a RoutingRule>
where
    F: Fn(&str) -> bool,
{
    rules.ordered_rules().into_iter().find(|rule| {
        if !rule.condition.matches(metadata) {
            return false;
        }
        if is_available(&rule.provider) {
            return true;
        }
        tracing::debug!(
            rule = %rule.name,
            provider = %rule.provider,
            "Rule matched but provider is unavailable, continuing"
        );
        false
    })
}

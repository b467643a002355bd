//! Query Routing
//!
//! Decides which provider answers a query and drives the attempt loop when a
//! provider fails.
//!
//! # Architecture
//!
//! ```text
//!  query ──► RoutingEngine ──► RoutingDecision ──► FallbackOrchestrator
//!              │    ▲                                   │
//!              │    └── RoutingRuleSet (rules.rs)       ▼
//!              └──────── ProviderRegistry ◄──── StreamEvent stream
//! ```
//!
//! The rule set and registry are built once at startup and shared read-only.

pub mod engine;
pub mod fallback;
pub mod rules;

pub use engine::{RouteError, RoutingDecision, RoutingEngine};
pub use fallback::{AttemptStatus, EventStream, FallbackOrchestrator, StreamEvent};
pub use rules::{select_rule, RoutingRule, RoutingRuleSet, RuleCondition, DEFAULT_RULE_PRIORITY};

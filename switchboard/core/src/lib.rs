//! Switchboard Core - LLM Query Routing and Fallback
//!
//! This crate decides which hosted language model answers a query and keeps
//! the answer flowing when a provider fails. It classifies each query, picks a
//! provider through priority-ordered rules, and streams the response from the
//! first provider in the fallback order that completes.
//!
//! # Architecture
//!
//! ```text
//!                      query (+ optional preferred provider)
//!                                     │
//! ┌───────────────────────────────────┼───────────────────────────────┐
//! │                        SWITCHBOARD CORE                           │
//! │                                   ▼                               │
//! │  ┌───────────────┐   ┌──────────────────┐   ┌──────────────────┐  │
//! │  │ QueryAnalyzer │──►│  RoutingEngine   │──►│     Fallback     │  │
//! │  │ (type, size)  │   │ (rules, order)   │   │   Orchestrator   │  │
//! │  └───────────────┘   └────────┬─────────┘   └────────┬─────────┘  │
//! │                               │                      │            │
//! │                      ┌────────▼──────────────────────▼─────────┐  │
//! │                      │            ProviderRegistry             │  │
//! │                      │   OpenAI  │  Anthropic  │  Google       │  │
//! │                      └─────────────────────────────────────────┘  │
//! └───────────────────────────────────────────────────────────────────┘
//!                                     │
//!                      StreamEvent stream (routing, attempts,
//!                      content, errors, complete | fatal)
//! ```
//!
//! # Key Types
//!
//! - [`Router`]: The entry point, built once and shared
//! - [`QueryAnalyzer`]: Classifies query text
//! - [`RoutingEngine`]: Selects provider and model, computes the fallback order
//! - [`FallbackOrchestrator`]: Tries providers in order and emits [`StreamEvent`]s
//! - [`ProviderAdapter`]: The interface every backend implements
//!
//! # Quick Start
//!
//! ```ignore
//! use futures::StreamExt;
//! use switchboard_core::{config::load_settings, Router};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = load_settings()?;
//!     let router = Router::from_settings(&settings);
//!
//!     let mut events = router.query("Write a haiku about rust", None)?;
//!     while let Some(event) = events.next().await {
//!         println!("{}", serde_json::to_string(&event)?);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`analyzer`]: Query classification
//! - [`routing`]: Rules, routing engine and fallback orchestration
//! - [`provider`]: Adapter trait, registry and usage accounting
//! - [`backend`]: OpenAI, Anthropic and Google adapters
//! - [`config`]: Settings file, environment and rule source loading
//! - [`router`]: The caller-facing facade

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod analyzer;
pub mod backend;
pub mod config;
pub mod provider;
pub mod router;
pub mod routing;

// Re-exports for convenience
pub use analyzer::{Complexity, QueryAnalyzer, QueryMetadata, QueryType};
pub use provider::{
    BackendError, ChunkStream, CompletionRequest, ProviderAdapter, ProviderRegistry,
    ProviderReport, ProviderStats, ProviderStatus, UsageTracker,
};
pub use router::Router;

// Routing exports
pub use routing::{
    AttemptStatus, EventStream, FallbackOrchestrator, RouteError, RoutingDecision, RoutingEngine,
    RoutingRule, RoutingRuleSet, RuleCondition, StreamEvent,
};

// Config exports
pub use config::{
    default_config_path, load_rule_set, load_settings, load_settings_from_path, try_load_rule_set,
    ConfigError, ConfigOverrides, ConfigSource, Settings, SwitchboardToml,
};

//! Provider Abstraction
//!
//! The routing engine never talks to a vendor directly. Every backend it can
//! dispatch to is reached through the [`ProviderAdapter`] trait, and the set of
//! configured adapters is held by the [`ProviderRegistry`].
//!
//! # Layout
//!
//! - [`traits`]: the adapter contract, completion requests and backend errors
//! - [`stats`]: per-adapter usage and cost accounting
//! - [`registry`]: which providers exist, which are usable, and why not

mod registry;
mod stats;
mod traits;

pub use registry::{
    ProviderRegistry, ProviderRegistryBuilder, ProviderReport, ProviderStatus, KNOWN_PROVIDERS,
};
pub use stats::{ProviderStats, UsageTracker};
pub use traits::{BackendError, ChunkStream, CompletionRequest, ProviderAdapter};

//! Scholar-Relay: bounded-concurrency fan-out of chat completion and
//! academic search requests
//!
//! Completion calls go through a [`CompletionOrchestrator`], which admits
//! them through a shared [`ConcurrencyGate`], retries them with a linear
//! [`RetryPolicy`] and records token usage. Searches fan out across every
//! provider registered with a [`SearchAggregator`] (arXiv, Google Scholar,
//! general web), each normalizing its hits into [`SearchResult`]s.

pub mod completion;
pub mod config;
pub mod dispatch;
pub mod engines;
pub mod error;
pub mod metrics;
pub mod network;
pub mod results;
pub mod search;

pub use completion::{CompletionOrchestrator, CompletionRequest, CompletionResult, UsageLedger};
pub use config::Settings;
pub use dispatch::{ConcurrencyGate, RetryPolicy};
pub use engines::{SearchOutcome, SearchProvider};
pub use error::RelayError;
pub use results::SearchResult;
pub use search::{SearchAggregator, SearchQuery};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// User-Agent sent with every outgoing request
pub const USER_AGENT: &str = concat!("scholar-relay/", env!("CARGO_PKG_VERSION"));

/// Default timeout for search requests in seconds
pub const DEFAULT_SEARCH_TIMEOUT: f64 = 30.0;

/// Default number of in-flight completion calls per model
pub const DEFAULT_CONCURRENCY: usize = 20;

/// Default total attempts for a completion call
pub const DEFAULT_MAX_TRIES: u32 = 5;

/// Default linear backoff unit in milliseconds
pub const DEFAULT_BASE_DELAY_MS: u64 = 200;

//! Search provider traits and types

use crate::config::{ProviderConfig, SearchSettings};
use crate::dispatch::ConcurrencyGate;
use crate::error::{RelayError, Result};
use crate::metrics::{SearchObserver, TracingObserver};
use crate::network::HttpClient;
use crate::results::SearchResult;
use crate::search::SearchQuery;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// How a provider reaches its result count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Sequential page requests until the count is met
    Paged,
    /// One request returns everything
    SingleShot,
}

/// Results of one provider search, possibly cut short by a failure
#[derive(Debug, Default)]
pub struct SearchOutcome {
    /// Results gathered before the search ended
    pub results: Vec<SearchResult>,
    /// The failure that ended the search early, if any
    pub error: Option<RelayError>,
}

impl SearchOutcome {
    pub fn complete(results: Vec<SearchResult>) -> Self {
        Self {
            results,
            error: None,
        }
    }

    pub fn partial(results: Vec<SearchResult>, error: RelayError) -> Self {
        Self {
            results,
            error: Some(error),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_results(self) -> Vec<SearchResult> {
        self.results
    }
}

/// Shared collaborators handed to every provider at construction
#[derive(Clone)]
pub struct ProviderContext {
    pub client: HttpClient,
    pub observer: Arc<dyn SearchObserver>,
    /// Optional per-provider admission control, keyed by provider name
    pub gate: Option<Arc<ConcurrencyGate>>,
    /// Request timeout in seconds when the provider config has none
    pub default_timeout: f64,
    /// Backoff unit for page retries
    pub base_delay: Duration,
}

impl ProviderContext {
    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            observer: Arc::new(TracingObserver),
            gate: None,
            default_timeout: crate::DEFAULT_SEARCH_TIMEOUT,
            base_delay: Duration::from_millis(crate::DEFAULT_BASE_DELAY_MS),
        }
    }

    /// Context using the timeouts, backoff and gate from `settings`
    pub fn from_settings(client: HttpClient, settings: &SearchSettings) -> Self {
        let mut ctx = Self::new(client);
        ctx.default_timeout = settings.timeout;
        ctx.base_delay = Duration::from_millis(settings.base_delay_ms);
        ctx.gate = settings
            .concurrency
            .map(|n| Arc::new(ConcurrencyGate::new(n)));
        ctx
    }

    pub fn with_observer(mut self, observer: Arc<dyn SearchObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_gate(mut self, gate: Arc<ConcurrencyGate>) -> Self {
        self.gate = Some(gate);
        self
    }
}

/// A retrieval backend that normalizes its hits into [`SearchResult`]s
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Provider name (unique among registered providers)
    fn name(&self) -> &str {
        &self.config().name
    }

    /// Label written into `SearchResult::source`
    fn source_label(&self) -> &str;

    fn capability(&self) -> Capability;

    /// Current configuration
    fn config(&self) -> &ProviderConfig;

    /// Replace the configuration; the kind must not change
    fn reconfigure(&mut self, config: ProviderConfig) -> Result<()>;

    /// Run a search.
    ///
    /// Only invalid parameters produce `Err`, and always before any request is
    /// sent. Network and provider failures end the search early and are
    /// reported through the outcome and the observer.
    async fn search(&self, query: &SearchQuery) -> Result<SearchOutcome>;
}

/// Shared validation for `reconfigure` implementations
pub(crate) fn check_reconfigure(current: &ProviderConfig, next: &ProviderConfig) -> Result<()> {
    if current.kind != next.kind {
        return Err(RelayError::Config(format!(
            "cannot change {} from {} to {}",
            current.name,
            current.kind.as_str(),
            next.kind.as_str()
        )));
    }
    next.validate()
        .map_err(|e| RelayError::Config(e.to_string()))?;
    if next.kind.requires_api_key() && next.api_key.as_deref().map_or(true, str::is_empty) {
        return Err(RelayError::Config(format!("{} requires an API key", next.name)));
    }
    Ok(())
}

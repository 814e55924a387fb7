//! Fan-out search across every registered provider

use super::models::SearchQuery;
use crate::engines::{SearchOutcome, SearchProvider};
use crate::error::Result;
use crate::results::{dedup_by_url, SearchResult};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Runs one query against all providers concurrently and merges the results
#[derive(Default)]
pub struct SearchAggregator {
    /// Providers in registration order
    providers: Vec<Arc<dyn SearchProvider>>,
    /// Drop later results whose url was already returned
    dedup: bool,
}

impl SearchAggregator {
    /// Create an aggregator with no providers
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider; results are merged in registration order
    pub fn add_provider(&mut self, provider: Arc<dyn SearchProvider>) {
        debug!(provider = provider.name(), "registering provider");
        self.providers.push(provider);
    }

    pub fn with_provider(mut self, provider: Arc<dyn SearchProvider>) -> Self {
        self.add_provider(provider);
        self
    }

    pub fn with_dedup(mut self, dedup: bool) -> Self {
        self.dedup = dedup;
        self
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Registered provider names, in order
    pub fn names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Get a provider by name
    pub fn get(&self, name: &str) -> Option<&Arc<dyn SearchProvider>> {
        self.providers.iter().find(|p| p.name() == name)
    }

    /// Per-provider outcomes, in registration order
    pub async fn search_outcomes(
        &self,
        query: &SearchQuery,
    ) -> Vec<(String, Result<SearchOutcome>)> {
        let futures = self.providers.iter().map(|provider| async move {
            let outcome = provider.search(query).await;
            (provider.name().to_string(), outcome)
        });
        join_all(futures).await
    }

    /// Search every provider and concatenate their results.
    ///
    /// A provider that rejects the query or fails contributes whatever it
    /// gathered; the other providers are unaffected.
    pub async fn search(&self, query: &SearchQuery) -> Vec<SearchResult> {
        if self.providers.is_empty() {
            warn!("search requested with no providers registered");
            return Vec::new();
        }

        info!(
            "Executing search '{}' on {} providers",
            query.text,
            self.providers.len()
        );
        let start = Instant::now();

        let mut results = Vec::new();
        for (name, outcome) in self.search_outcomes(query).await {
            match outcome {
                Ok(outcome) => {
                    if let Some(ref err) = outcome.error {
                        debug!(
                            "Provider {} stopped early with {} results: {}",
                            name,
                            outcome.results.len(),
                            err
                        );
                    }
                    results.extend(outcome.into_results());
                }
                Err(e) => {
                    warn!("Provider {} rejected the query: {}", name, e);
                }
            }
        }

        if self.dedup {
            let before = results.len();
            results = dedup_by_url(results);
            debug!("Removed {} duplicate results", before - results.len());
        }

        info!(
            "Search '{}' returned {} results in {:?}",
            query.text,
            results.len(),
            start.elapsed()
        );
        results
    }
}

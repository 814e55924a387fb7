//! Search observability
//!
//! Providers absorb their own failures; this is where those failures go.

use crate::error::RelayError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, warn};

/// Receives the outcome of every provider search
pub trait SearchObserver: Send + Sync {
    /// A search finished with every page it needed
    fn on_success(&self, provider: &str, result_count: usize, elapsed: Duration);

    /// A search stopped early; `partial_count` results were kept
    fn on_failure(&self, provider: &str, error: &RelayError, partial_count: usize, elapsed: Duration);
}

/// Observer that writes outcomes to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl SearchObserver for TracingObserver {
    fn on_success(&self, provider: &str, result_count: usize, elapsed: Duration) {
        debug!(provider, result_count, ?elapsed, "search completed");
    }

    fn on_failure(&self, provider: &str, error: &RelayError, partial_count: usize, elapsed: Duration) {
        warn!(
            provider,
            partial_count,
            ?elapsed,
            error = %error,
            "search failed, returning partial results"
        );
    }
}

/// Per-provider counters and response times
pub struct ProviderMetrics {
    /// Total searches observed
    total_searches: AtomicU64,
    /// Response times per provider (last 100, in ms)
    response_times: RwLock<HashMap<String, Vec<u64>>>,
    /// Failure counts
    errors: RwLock<HashMap<String, u64>>,
    /// Success counts
    successes: RwLock<HashMap<String, u64>>,
    /// Last error message per provider
    last_errors: RwLock<HashMap<String, String>>,
}

impl ProviderMetrics {
    pub fn new() -> Self {
        Self {
            total_searches: AtomicU64::new(0),
            response_times: RwLock::new(HashMap::new()),
            errors: RwLock::new(HashMap::new()),
            successes: RwLock::new(HashMap::new()),
            last_errors: RwLock::new(HashMap::new()),
        }
    }

    fn record_response_time(&self, provider: &str, elapsed: Duration) {
        let mut times = self.response_times.write().unwrap_or_else(|e| e.into_inner());
        let entry = times.entry(provider.to_string()).or_default();

        if entry.len() >= 100 {
            entry.remove(0);
        }
        entry.push(elapsed.as_millis() as u64);
    }

    pub fn total_searches(&self) -> u64 {
        self.total_searches.load(Ordering::Relaxed)
    }

    pub fn errors(&self, provider: &str) -> u64 {
        let errors = self.errors.read().unwrap_or_else(|e| e.into_inner());
        errors.get(provider).copied().unwrap_or(0)
    }

    pub fn successes(&self, provider: &str) -> u64 {
        let successes = self.successes.read().unwrap_or_else(|e| e.into_inner());
        successes.get(provider).copied().unwrap_or(0)
    }

    pub fn last_error(&self, provider: &str) -> Option<String> {
        let last = self.last_errors.read().unwrap_or_else(|e| e.into_inner());
        last.get(provider).cloned()
    }

    /// Average response time for a provider
    pub fn avg_response_time(&self, provider: &str) -> Option<u64> {
        let times = self.response_times.read().unwrap_or_else(|e| e.into_inner());
        times.get(provider).and_then(|t| {
            if t.is_empty() {
                None
            } else {
                Some(t.iter().sum::<u64>() / t.len() as u64)
            }
        })
    }

    /// Success percentage for a provider
    pub fn reliability(&self, provider: &str) -> f64 {
        let error_count = self.errors(provider);
        let success_count = self.successes(provider);

        let total = error_count + success_count;
        if total == 0 {
            100.0
        } else {
            (success_count as f64 / total as f64) * 100.0
        }
    }

    /// Statistics for every provider seen so far
    pub fn provider_stats(&self) -> HashMap<String, ProviderStats> {
        let times = self.response_times.read().unwrap_or_else(|e| e.into_inner());
        times
            .keys()
            .map(|name| {
                (
                    name.clone(),
                    ProviderStats {
                        searches: self.errors(name) + self.successes(name),
                        avg_response_time: self.avg_response_time(name),
                        reliability: self.reliability(name),
                    },
                )
            })
            .collect()
    }
}

impl Default for ProviderMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchObserver for ProviderMetrics {
    fn on_success(&self, provider: &str, _result_count: usize, elapsed: Duration) {
        self.total_searches.fetch_add(1, Ordering::Relaxed);
        self.record_response_time(provider, elapsed);
        let mut successes = self.successes.write().unwrap_or_else(|e| e.into_inner());
        *successes.entry(provider.to_string()).or_insert(0) += 1;
    }

    fn on_failure(&self, provider: &str, error: &RelayError, _partial_count: usize, elapsed: Duration) {
        self.total_searches.fetch_add(1, Ordering::Relaxed);
        self.record_response_time(provider, elapsed);
        {
            let mut errors = self.errors.write().unwrap_or_else(|e| e.into_inner());
            *errors.entry(provider.to_string()).or_insert(0) += 1;
        }
        let mut last = self.last_errors.write().unwrap_or_else(|e| e.into_inner());
        last.insert(provider.to_string(), error.to_string());
    }
}

/// Statistics for a single provider
#[derive(Debug, Clone)]
pub struct ProviderStats {
    pub searches: u64,
    pub avg_response_time: Option<u64>,
    pub reliability: f64,
}

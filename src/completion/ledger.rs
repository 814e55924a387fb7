//! Token usage accounting

use super::types::TokenUsage;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// One completed (or failed) completion call
#[derive(Debug, Clone, Serialize)]
pub struct UsageRecord {
    pub model: String,
    pub usage: TokenUsage,
    pub success: bool,
    pub at: DateTime<Utc>,
}

/// Append-only usage history plus a call counter.
///
/// Owned by whoever builds the orchestrator; share it with `Arc` to pool
/// accounting across several orchestrators.
#[derive(Debug, Default)]
pub struct UsageLedger {
    calls: AtomicU64,
    records: Mutex<Vec<UsageRecord>>,
}

/// Totals over the ledger
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UsageSummary {
    pub calls: u64,
    pub failures: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl UsageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one call and append its usage
    pub fn record(&self, model: &str, usage: TokenUsage, success: bool) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.push(UsageRecord {
            model: model.to_string(),
            usage,
            success,
            at: Utc::now(),
        });
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Copy of every record so far
    pub fn records(&self) -> Vec<UsageRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn summary(&self) -> UsageSummary {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.iter().fold(
            UsageSummary {
                calls: self.calls(),
                ..Default::default()
            },
            |mut acc, r| {
                if !r.success {
                    acc.failures += 1;
                }
                acc.input_tokens += r.usage.input_tokens;
                acc.output_tokens += r.usage.output_tokens;
                acc
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_summary() {
        let ledger = UsageLedger::new();
        ledger.record(
            "m",
            TokenUsage {
                input_tokens: 10,
                output_tokens: 5,
            },
            true,
        );
        ledger.record("m", TokenUsage::default(), false);

        let summary = ledger.summary();
        assert_eq!(summary.calls, 2);
        assert_eq!(summary.failures, 1);
        assert_eq!(summary.input_tokens, 10);
        assert_eq!(summary.output_tokens, 5);
        assert_eq!(ledger.records().len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_appends() {
        let ledger = Arc::new(UsageLedger::new());
        let tasks: Vec<_> = (0..50)
            .map(|_| {
                let ledger = ledger.clone();
                tokio::spawn(async move { ledger.record("m", TokenUsage::default(), true) })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(ledger.calls(), 50);
        assert_eq!(ledger.records().len(), 50);
    }
}

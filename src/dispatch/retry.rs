//! Bounded retry loop with linear backoff

use crate::error::{RelayError, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Which failures earn another attempt
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryOn {
    /// Retry every transport and provider failure, including 4xx
    #[default]
    All,
    /// Abort on permanent client errors (4xx other than 408/429)
    Transient,
}

/// Retry policy: up to `max_tries` total attempts, waiting
/// `base_delay * (n + 1)` after the n-th failed attempt (0-based).
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_tries: u32,
    base_delay: Duration,
    retry_on: RetryOn,
}

impl RetryPolicy {
    pub fn new(max_tries: u32, base_delay: Duration) -> Self {
        Self {
            max_tries: max_tries.max(1),
            base_delay,
            retry_on: RetryOn::All,
        }
    }

    /// A single attempt, no retries
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn with_retry_on(mut self, retry_on: RetryOn) -> Self {
        self.retry_on = retry_on;
        self
    }

    /// Same policy with a different attempt budget
    pub fn with_max_tries(mut self, max_tries: u32) -> Self {
        self.max_tries = max_tries.max(1);
        self
    }

    pub fn max_tries(&self) -> u32 {
        self.max_tries
    }

    /// Delay inserted after failed attempt `attempt` (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * (attempt + 1)
    }

    fn should_retry(&self, err: &RelayError) -> bool {
        match err {
            RelayError::InvalidParameter(_) | RelayError::Config(_) | RelayError::Cancelled(_) => {
                false
            }
            other => match self.retry_on {
                RetryOn::All => true,
                RetryOn::Transient => other.is_transient(),
            },
        }
    }

    /// Run `op` until it succeeds, fails permanently, or the budget is spent.
    ///
    /// `op` receives the 0-based attempt number.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            let err = match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !self.should_retry(&err) {
                debug!(label, attempt = attempt + 1, error = %err, "not retrying");
                return Err(err);
            }

            if attempt + 1 >= self.max_tries {
                warn!(label, attempts = self.max_tries, error = %err, "retries exhausted");
                return Err(RelayError::RetriesExhausted {
                    attempts: self.max_tries,
                    last: Box::new(err),
                });
            }

            let delay = self.delay_for(attempt);
            debug!(
                label,
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "retrying after failure"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            crate::DEFAULT_MAX_TRIES,
            Duration::from_millis(crate::DEFAULT_BASE_DELAY_MS),
        )
    }
}

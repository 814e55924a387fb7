//! Per-key admission control for in-flight provider requests

use crate::error::{RelayError, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Caps simultaneous requests per logical key (model name, provider name).
///
/// Semaphores are created on first use. Acquiring the same key twice from one
/// logical call is not supported and can deadlock once capacity is reached.
#[derive(Debug)]
pub struct ConcurrencyGate {
    capacity: usize,
    overrides: HashMap<String, usize>,
    semaphores: Mutex<HashMap<String, Arc<Semaphore>>>,
}

/// Scoped permit; the slot is released when this is dropped
#[derive(Debug)]
pub struct GatePermit {
    key: String,
    _permit: OwnedSemaphorePermit,
}

impl GatePermit {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl ConcurrencyGate {
    /// Create a gate where every key admits `capacity` concurrent holders
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            overrides: HashMap::new(),
            semaphores: Mutex::new(HashMap::new()),
        }
    }

    /// Use a different capacity for one key
    pub fn with_capacity_for(mut self, key: impl Into<String>, capacity: usize) -> Self {
        self.overrides.insert(key.into(), capacity.max(1));
        self
    }

    /// Configured capacity for `key`
    pub fn capacity(&self, key: &str) -> usize {
        self.overrides.get(key).copied().unwrap_or(self.capacity)
    }

    /// Free slots for `key` right now
    pub fn available(&self, key: &str) -> usize {
        self.semaphore(key).available_permits()
    }

    /// Wait for a slot under `key`.
    ///
    /// Dropping the returned future while it waits gives up the place in line
    /// without taking a slot.
    pub async fn acquire(&self, key: &str) -> Result<GatePermit> {
        let semaphore = self.semaphore(key);
        let permit = semaphore
            .acquire_owned()
            .await
            .map_err(|_| RelayError::Cancelled(format!("gate for {} closed", key)))?;
        debug!(key, remaining = self.available(key), "acquired gate permit");
        Ok(GatePermit {
            key: key.to_string(),
            _permit: permit,
        })
    }

    fn semaphore(&self, key: &str) -> Arc<Semaphore> {
        let mut map = self.semaphores.lock().unwrap_or_else(|e| e.into_inner());
        map.entry(key.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.capacity(key))))
            .clone()
    }
}

impl Default for ConcurrencyGate {
    fn default() -> Self {
        Self::new(crate::DEFAULT_CONCURRENCY)
    }
}

//! Bounded, retried dispatch of chat completion requests

use super::ledger::UsageLedger;
use super::provider::{chat_provider, ChatProvider};
use super::types::{CompletionRequest, CompletionResult, TokenUsage};
use crate::config::CompletionSettings;
use crate::dispatch::{ConcurrencyGate, RetryPolicy};
use crate::error::{RelayError, Result};
use crate::network::HttpClient;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Entry point for single and batched chat completions.
///
/// Every call goes through the gate (keyed by model) and the retry policy,
/// and leaves exactly one record in the usage ledger.
pub struct CompletionOrchestrator {
    provider: Arc<dyn ChatProvider>,
    gate: Arc<ConcurrencyGate>,
    ledger: Arc<UsageLedger>,
    retry: RetryPolicy,
    model: String,
    temperature: f64,
}

impl CompletionOrchestrator {
    /// Orchestrator with its own gate and ledger
    pub fn new(provider: Arc<dyn ChatProvider>, settings: &CompletionSettings) -> Self {
        Self {
            provider,
            gate: Arc::new(ConcurrencyGate::new(settings.concurrency)),
            ledger: Arc::new(UsageLedger::new()),
            retry: RetryPolicy::new(settings.max_tries, settings.base_delay())
                .with_retry_on(settings.retry_on),
            model: settings.model.clone(),
            temperature: settings.temperature,
        }
    }

    /// Orchestrator talking to the backend configured in `settings`
    pub fn from_settings(client: HttpClient, settings: &CompletionSettings) -> Result<Self> {
        Ok(Self::new(chat_provider(client, settings)?, settings))
    }

    /// Share a gate with other orchestrators so their in-flight counts pool
    pub fn with_gate(mut self, gate: Arc<ConcurrencyGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_ledger(mut self, ledger: Arc<UsageLedger>) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn gate(&self) -> &Arc<ConcurrencyGate> {
        &self.gate
    }

    pub fn ledger(&self) -> &Arc<UsageLedger> {
        &self.ledger
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Run one completion: validate, wait for a gate slot, retry, record usage
    pub async fn complete(&self, request: CompletionRequest) -> Result<CompletionResult> {
        if let Err(err) = request.validate() {
            self.ledger
                .record(&request.model, TokenUsage::default(), false);
            warn!(model = %request.model, error = %err, "completion rejected");
            return Err(err);
        }

        let permit = match self.gate.acquire(&request.model).await {
            Ok(permit) => permit,
            Err(err) => {
                self.ledger
                    .record(&request.model, TokenUsage::default(), false);
                return Err(err);
            }
        };
        let retry = match request.max_tries {
            Some(n) => self.retry.clone().with_max_tries(n),
            None => self.retry.clone(),
        };

        let provider = &self.provider;
        let req = &request;
        let outcome = retry
            .run(&request.model, |_| async move {
                let result = provider.chat(req).await?;
                if result.content.trim().is_empty() {
                    return Err(RelayError::EmptyResponse(req.model.clone()));
                }
                Ok(result)
            })
            .await;
        drop(permit);

        match outcome {
            Ok(result) => {
                self.ledger.record(&request.model, result.usage, true);
                debug!(
                    model = %request.model,
                    tokens = result.usage.total(),
                    "completion succeeded"
                );
                Ok(result)
            }
            Err(err) => {
                self.ledger
                    .record(&request.model, TokenUsage::default(), false);
                warn!(
                    model = %request.model,
                    message_len = request.content_len(),
                    error = %err,
                    "completion failed"
                );
                match err.root() {
                    RelayError::EmptyResponse(_) => Err(RelayError::EmptyResponse(format!(
                        "{} after {} attempt(s), message length {}",
                        request.model,
                        retry.max_tries(),
                        request.content_len()
                    ))),
                    _ => Err(err),
                }
            }
        }
    }

    /// Like [`complete`](Self::complete), but gives up at `deadline`.
    ///
    /// The in-flight call is dropped, which releases its gate slot, and a
    /// failure is recorded in its place.
    pub async fn complete_within(
        &self,
        request: CompletionRequest,
        deadline: Duration,
    ) -> Result<CompletionResult> {
        let model = request.model.clone();
        match tokio::time::timeout(deadline, self.complete(request)).await {
            Ok(result) => result,
            Err(_) => {
                self.ledger.record(&model, TokenUsage::default(), false);
                warn!(model = %model, ?deadline, "completion cancelled at deadline");
                Err(RelayError::Cancelled(format!(
                    "{} did not finish within {:?}",
                    model, deadline
                )))
            }
        }
    }

    /// Run every request concurrently; output is index-aligned with input.
    ///
    /// Failed slots hold a failure-describing result instead of being dropped.
    /// The ledger gains exactly one record per request, including requests
    /// rejected by validation.
    pub async fn complete_batch(&self, requests: Vec<CompletionRequest>) -> Vec<CompletionResult> {
        let total = requests.len();
        info!(total, "dispatching completion batch");

        let futures = requests.into_iter().map(|request| async move {
            match self.complete(request).await {
                Ok(result) => result,
                Err(err) => CompletionResult::failed(&err),
            }
        });
        let results = join_all(futures).await;

        debug!(total, "completion batch finished");
        results
    }

    /// Single-turn prompt against the default model.
    ///
    /// Failures come back as a descriptive message rather than an error.
    pub async fn chat(&self, text: impl Into<String>, temperature: f64) -> String {
        let request = CompletionRequest::prompt(&self.model, text).with_temperature(temperature);
        match self.complete(request).await {
            Ok(result) => result.content,
            Err(err) => CompletionResult::failed(&err).content,
        }
    }

    /// Single-turn prompts against the default model, index-aligned
    pub async fn batch_chat<I, S>(&self, texts: I, temperature: f64) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let requests = texts
            .into_iter()
            .map(|text| CompletionRequest::prompt(&self.model, text).with_temperature(temperature))
            .collect();
        self.complete_batch(requests)
            .await
            .into_iter()
            .map(|r| r.content)
            .collect()
    }

    /// Default request for `text` using the configured model and temperature
    pub fn request(&self, text: impl Into<String>) -> CompletionRequest {
        CompletionRequest::prompt(&self.model, text).with_temperature(self.temperature)
    }
}

//! Chat completion orchestration
//!
//! Bounded-concurrency, retried chat completion calls with usage accounting.

mod gemini;
mod ledger;
mod orchestrator;
mod provider;
mod types;

pub use gemini::GeminiProvider;
pub use ledger::{UsageLedger, UsageRecord, UsageSummary};
pub use orchestrator::CompletionOrchestrator;
pub use provider::{chat_provider, ChatProvider, OpenAiProvider};
pub use types::*;

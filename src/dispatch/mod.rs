//! Admission control and retry for outgoing provider calls

mod gate;
mod retry;

pub use gate::{ConcurrencyGate, GatePermit};
pub use retry::{RetryOn, RetryPolicy};

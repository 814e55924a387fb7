//! HTTP networking module
//!
//! Provides the single request/response cycle every provider goes through.

mod client;
mod request;

pub use client::HttpClient;
pub use request::{HttpMethod, ProviderRequest, ProviderResponse};

//! Search orchestration module
//!
//! Fans a query out across the registered providers and merges their
//! results in registration order.

mod aggregator;
mod models;

pub use aggregator::SearchAggregator;
pub use models::*;

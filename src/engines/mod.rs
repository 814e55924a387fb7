//! Search provider module
//!
//! Defines the SearchProvider trait, the shared paging engine, and the
//! concrete arXiv, Google Scholar and web backends.

mod loader;
pub mod paging;
mod traits;

// Provider implementations
pub mod arxiv;
pub mod scholar;
pub mod web;

pub use loader::ProviderLoader;
pub use traits::*;

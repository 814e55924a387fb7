//! Normalized search result types
//!
//! Every provider maps its native response into [`SearchResult`].

mod types;

pub use types::*;

//! Search query and related data models

use crate::error::{RelayError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Extra-parameter keys consumed by the relay itself and never forwarded
pub const RESERVED_KEYS: &[&str] = &["max_results", "timeout", "api_key", "page", "sort_by"];

/// Result ordering understood by the providers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortCriterion {
    #[default]
    #[serde(rename = "relevance")]
    Relevance,
    #[serde(rename = "lastUpdatedDate")]
    LastUpdatedDate,
    #[serde(rename = "submittedDate")]
    SubmittedDate,
}

impl SortCriterion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Relevance => "relevance",
            Self::LastUpdatedDate => "lastUpdatedDate",
            Self::SubmittedDate => "submittedDate",
        }
    }
}

impl FromStr for SortCriterion {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "relevance" => Ok(Self::Relevance),
            "lastUpdatedDate" => Ok(Self::LastUpdatedDate),
            "submittedDate" => Ok(Self::SubmittedDate),
            other => Err(RelayError::InvalidParameter(format!(
                "unknown sort_by value: {} (expected relevance, lastUpdatedDate or submittedDate)",
                other
            ))),
        }
    }
}

impl fmt::Display for SortCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A search request, created per call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchQuery {
    /// The search query string
    pub text: String,
    /// Requested number of results
    pub max_results: Option<i64>,
    /// Sort criterion name
    pub sort_by: Option<String>,
    /// Provider-specific parameters, forwarded verbatim where supported
    #[serde(default)]
    pub extra: Map<String, Value>,
}

impl SearchQuery {
    /// Create a query with provider defaults for everything else
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_max_results(mut self, count: i64) -> Self {
        self.max_results = Some(count);
        self
    }

    pub fn with_sort(mut self, sort_by: impl Into<String>) -> Self {
        self.sort_by = Some(sort_by.into());
        self
    }

    /// Add a provider-specific parameter
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Requested count, validated to be a positive integer.
    ///
    /// A `max_results` entry in `extra` is accepted when the typed field is unset.
    pub fn requested_count(&self, default: usize) -> Result<usize> {
        let count = match (self.max_results, self.extra.get("max_results")) {
            (Some(n), _) => n,
            (None, Some(value)) => value.as_i64().ok_or_else(|| {
                RelayError::InvalidParameter(format!(
                    "max_results must be a positive integer, got {}",
                    value
                ))
            })?,
            (None, None) => return Ok(default),
        };
        if count <= 0 {
            return Err(RelayError::InvalidParameter(format!(
                "max_results must be a positive integer, got {}",
                count
            )));
        }
        Ok(count as usize)
    }

    /// Sort criterion from the query, else `default`, else relevance
    pub fn sort_criterion(&self, default: Option<&str>) -> Result<SortCriterion> {
        match self.sort_by.as_deref().or(default) {
            Some(name) => name.parse(),
            None => Ok(SortCriterion::default()),
        }
    }

    /// Extras minus the reserved keys
    pub fn forwarded_extras(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.extra
            .iter()
            .filter(|(k, _)| !RESERVED_KEYS.contains(&k.as_str()))
    }

    /// Check if query is empty
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requested_count() {
        assert_eq!(SearchQuery::new("q").requested_count(10).unwrap(), 10);
        assert_eq!(
            SearchQuery::new("q").with_max_results(3).requested_count(10).unwrap(),
            3
        );
        assert!(SearchQuery::new("q").with_max_results(0).requested_count(10).is_err());
        assert!(SearchQuery::new("q").with_max_results(-4).requested_count(10).is_err());
    }

    #[test]
    fn test_requested_count_from_extra() {
        let ok = SearchQuery::new("q").with_extra("max_results", 7);
        assert_eq!(ok.requested_count(10).unwrap(), 7);

        let wrong_type = SearchQuery::new("q").with_extra("max_results", "invalid");
        assert!(matches!(
            wrong_type.requested_count(10),
            Err(RelayError::InvalidParameter(_))
        ));

        let float = SearchQuery::new("q").with_extra("max_results", 2.5);
        assert!(float.requested_count(10).is_err());
    }

    #[test]
    fn test_sort_criterion() {
        let query = SearchQuery::new("q");
        assert_eq!(query.sort_criterion(None).unwrap(), SortCriterion::Relevance);
        assert_eq!(
            query.sort_criterion(Some("submittedDate")).unwrap(),
            SortCriterion::SubmittedDate
        );
        assert_eq!(
            query
                .clone()
                .with_sort("lastUpdatedDate")
                .sort_criterion(Some("submittedDate"))
                .unwrap(),
            SortCriterion::LastUpdatedDate
        );
        assert!(query.with_sort("newest").sort_criterion(None).is_err());
    }

    #[test]
    fn test_forwarded_extras_skip_reserved() {
        let query = SearchQuery::new("q")
            .with_extra("as_ylo", 2020)
            .with_extra("page", 3)
            .with_extra("api_key", "leak");
        let keys: Vec<_> = query.forwarded_extras().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["as_ylo"]);
    }
}

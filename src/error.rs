//! Error taxonomy shared by the completion and search paths

use thiserror::Error;

/// Errors produced while dispatching requests to providers
#[derive(Debug, Error)]
pub enum RelayError {
    /// Malformed caller input; never retried
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Network-level failure (timeout, connection reset, DNS)
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-success status or malformed payload from a reachable provider
    #[error("provider error{}: {message}", fmt_status(.status))]
    Provider {
        status: Option<u16>,
        message: String,
    },

    /// Provider answered successfully but with nothing usable
    #[error("empty response from {0}")]
    EmptyResponse(String),

    /// Every attempt allowed by the retry policy failed
    #[error("request failed after {attempts} attempt(s); last error: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<RelayError>,
    },

    /// The caller's deadline elapsed or the call was abandoned
    #[error("request cancelled: {0}")]
    Cancelled(String),

    /// Invalid or incomplete configuration
    #[error("configuration error: {0}")]
    Config(String),
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({})", s)).unwrap_or_default()
}

impl RelayError {
    pub fn provider(status: u16, message: impl Into<String>) -> Self {
        Self::Provider {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Provider {
            status: None,
            message: message.into(),
        }
    }

    /// HTTP status carried by this error, looking through retry exhaustion
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Provider { status, .. } => *status,
            Self::RetriesExhausted { last, .. } => last.status(),
            _ => None,
        }
    }

    /// Whether the failure is worth another attempt under a strict policy.
    ///
    /// 4xx statuses are permanent except request timeout and rate limiting.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::EmptyResponse(_) => true,
            Self::Provider { status: None, .. } => true,
            Self::Provider {
                status: Some(code),
                ..
            } => !(400..500).contains(code) || *code == 408 || *code == 429,
            _ => false,
        }
    }

    /// The innermost error, unwrapping retry exhaustion
    pub fn root(&self) -> &RelayError {
        match self {
            Self::RetriesExhausted { last, .. } => last.root(),
            other => other,
        }
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            Self::provider(status.as_u16(), err.to_string())
        } else if err.is_decode() {
            Self::malformed(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        Self::malformed(format!("invalid JSON: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(RelayError::Transport("reset".into()).is_transient());
        assert!(RelayError::provider(503, "unavailable").is_transient());
        assert!(RelayError::provider(429, "slow down").is_transient());
        assert!(!RelayError::provider(401, "bad key").is_transient());
        assert!(!RelayError::InvalidParameter("count".into()).is_transient());
    }

    #[test]
    fn test_status_through_exhaustion() {
        let err = RelayError::RetriesExhausted {
            attempts: 3,
            last: Box::new(RelayError::provider(500, "boom")),
        };
        assert_eq!(err.status(), Some(500));
        assert!(err.to_string().contains("3 attempt(s)"));
        assert!(matches!(err.root(), RelayError::Provider { .. }));
    }
}

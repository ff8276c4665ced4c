//! Error types for the simulator client.

use std::time::Duration;

use thiserror::Error;

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to the simulator backend.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// No response from the backend
    #[error("connection failed: {0}")]
    Connection(String),

    /// Backend answered with a non-2xx status
    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body was not the expected JSON shape
    #[error("decode error: {0}")]
    Decode(String),

    /// Request exceeded the configured timeout
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Invalid client configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Response decoded but failed model validation
    #[error("model error: {0}")]
    Model(#[from] dial_model::Error),
}

impl Error {
    /// Whether the failure is about reaching the backend rather than
    /// understanding it. Callers treat both the same way.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            Error::Connection(_) | Error::Status { .. } | Error::Timeout(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Decode(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_connectivity() {
        assert!(Error::Timeout(Duration::from_secs(1)).is_connectivity());
        assert!(Error::Status {
            status: 404,
            body: String::new()
        }
        .is_connectivity());
        assert!(!Error::Decode("x".into()).is_connectivity());
    }

    #[test]
    fn json_errors_become_decode() {
        let err: Error = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, Error::Decode(_)));
    }
}

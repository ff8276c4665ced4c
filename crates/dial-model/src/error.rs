//! Error types for dial-model.

use thiserror::Error;

/// Result type for dial-model operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while parsing backend data into model types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// An address string did not match `node[:port]/process/program#instance`.
    #[error("invalid address {input:?}: {reason}")]
    InvalidAddress {
        input: String,
        reason: &'static str,
    },

    /// A `time/theta` key could not be parsed.
    #[error("invalid clock: {0}")]
    InvalidClock(String),

    /// A backend document had an unexpected shape.
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Decode(e.to_string())
    }
}

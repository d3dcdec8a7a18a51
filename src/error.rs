//! Error types for hubtools
//!
//! The engine distinguishes failures that are recorded and skipped (a failed
//! archive batch), failures that abort one operation (schema lookups, bad input
//! files, exhausted page retries) and cooperative cancellation.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// A failed call to the remote API.
///
/// `status` is `None` when the request never produced an HTTP response
/// (connection refused, timeout, TLS failure).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: Option<u16>,
    pub message: String,
}

impl ApiError {
    #[must_use]
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "HTTP {status}: {}", self.message),
            None => write!(f, "network error: {}", self.message),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::http(status.as_u16(), err.to_string()),
            None => Self::network(err.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// Remote call failed after any retries the path allows
    #[error("API request failed: {0}")]
    Transport(#[from] ApiError),

    /// Object types or their properties could not be enumerated
    #[error("could not load schema for {object}: {source}")]
    SchemaLookup {
        object: String,
        #[source]
        source: ApiError,
    },

    /// Input CSV is unusable; nothing was processed
    #[error("invalid input file {}: {reason}", path.display())]
    InputFormat { path: PathBuf, reason: String },

    /// The object type is not known to the remote schema
    #[error("unknown object type: {0}")]
    UnknownObjectType(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl EngineError {
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

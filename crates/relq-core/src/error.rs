//! Error types for relq.

use thiserror::Error;

/// Result type alias using relq's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for queue operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Datastore operation failed (wraps sqlx::Error)
    #[error("Queue store error: {0}")]
    Store(#[from] sqlx::Error),

    /// Job or record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A stored payload could not be turned back into a registered job
    #[error("Hydration error: {0}")]
    Hydration(String),

    /// Cron expression rejected by the parser
    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidCron { expression: String, reason: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The connection was closed before the call
    #[error("Connection closed: {0}")]
    Closed(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl Error {
    /// True when the error came from the datastore rather than from input or data quality.
    pub fn is_store(&self) -> bool {
        matches!(self, Error::Store(_))
    }
}

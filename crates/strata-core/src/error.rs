//! Error types for strata-core.

use thiserror::Error;

/// Result type alias using strata-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for record storage and type parsing
#[derive(Error, Debug)]
pub enum Error {
    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,

    // Record errors
    #[error("Invalid vector record {id}: {message}")]
    InvalidRecord { id: String, message: String },

    #[error("Unknown memory type: {0}")]
    UnknownMemoryType(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Create an invalid record error
    pub fn invalid_record(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            id: id.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

use thiserror::Error;

/// Canonical error type for load-test engine operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Entity was not found in the history store.
    #[error("{entity} `{id}` was not found")]
    NotFound {
        /// Entity type name (e.g. `"test history"`).
        entity: &'static str,
        /// Identifier of the missing entity.
        id: String,
    },

    /// A load test is already active (or still finalising).
    #[error("a performance test is currently running")]
    AlreadyRunning,

    /// Validation error for a submitted request.
    #[error("validation error: {0}")]
    Validation(String),

    /// Unexpected internal error occurred.
    #[error("internal error: {message}")]
    Internal {
        /// Human-readable details for debugging purposes.
        message: String,
    },

    /// I/O error occurred during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error occurred.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error occurred.
    #[error("deserialization error: {0}")]
    Deserialization(String),
}

impl CoreError {
    /// Creates a `NotFound` variant.
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Creates a `Validation` variant.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Creates an `Internal` variant.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_eof() || err.is_syntax() || err.is_data() {
            Self::Deserialization(err.to_string())
        } else {
            Self::Serialization(err.to_string())
        }
    }
}

/// Convenient result alias for engine operations.
pub type CoreResult<T> = Result<T, CoreError>;

//! Error types for DreamOracle storage.

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record.
        entity: &'static str,
        /// Key that was looked up.
        id: String,
    },
}

impl From<StoreError> for dream_oracle_core::DomainError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity: "user", id } => Self::UserNotFound { user_id: id },
            other => Self::Storage(other.to_string()),
        }
    }
}

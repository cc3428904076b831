//! Error types for DreamOracle domain operations.

use crate::ids::IdError;

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;

/// Errors raised by metering, reconciliation and biorhythm requests.
///
/// An exhausted quota is not an error: it is reported as a denied
/// [`LimitCheck`](crate::LimitCheck).
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    /// The referenced user does not exist.
    #[error("user not found: {user_id}")]
    UserNotFound {
        /// The user ID or external reference that was not found.
        user_id: String,
    },

    /// A payment-processor price ID is not mapped to any tier.
    #[error("unknown price id: {price_id}")]
    UnknownPriceId {
        /// The unmapped price ID.
        price_id: String,
    },

    /// The user has not set a birth date.
    #[error("birth date required")]
    BirthDateRequired,

    /// A requested date range is empty or too long.
    #[error("invalid date range: {0}")]
    InvalidDateRange(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),
}

//! `RocksDB` storage layer for DreamOracle.
//!
//! This crate persists users' billing state, the append-only usage log and the
//! invoices mirrored from the payment processor.
//!
//! # Architecture
//!
//! The storage uses the following column families:
//!
//! - `users`: user billing records, keyed by `user_id`
//! - `users_by_customer`: payment-processor customer ID to `user_id`
//! - `usage_logs`: usage log entries, keyed for time-bounded counting per `(user, action)`
//! - `invoices`: invoices, keyed by upstream invoice ID (the deduplication key)
//! - `invoices_by_user`: index for listing a user's invoices
//! - `invoice_counters`: per-year invoice sequence
//!
//! # Example
//!
//! ```no_run
//! use chrono::Utc;
//! use dream_oracle_core::{MeteredAction, UsageLog, User, UserId};
//! use dream_oracle_store::{RocksStore, Store};
//!
//! let store = RocksStore::open("/tmp/dream-oracle-db").unwrap();
//!
//! let user = User::register(UserId::generate(), Utc::now(), 7);
//! store.put_user(&user).unwrap();
//!
//! let log = UsageLog::new(user.id, MeteredAction::Dream, Utc::now(), None);
//! store.append_usage_log(&log).unwrap();
//!
//! let used = store
//!     .count_usage_since(&user.id, MeteredAction::Dream, user.created_at)
//!     .unwrap();
//! assert_eq!(used, 1);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod rocks;
pub mod schema;

pub use error::{Result, StoreError};
pub use rocks::RocksStore;

use chrono::{DateTime, Utc};

use dream_oracle_core::{Invoice, InvoiceDraft, MeteredAction, UsageLog, User, UserId};

/// Result of an idempotent invoice insert.
#[derive(Debug, Clone, PartialEq)]
pub enum InvoiceOutcome {
    /// A new invoice was numbered and stored.
    Created(Invoice),
    /// An invoice with the same upstream ID already exists; nothing was written.
    AlreadyExists(Invoice),
}

impl InvoiceOutcome {
    /// The stored invoice, whichever way it was obtained.
    #[must_use]
    pub fn invoice(&self) -> &Invoice {
        match self {
            Self::Created(invoice) | Self::AlreadyExists(invoice) => invoice,
        }
    }
}

/// Result of a read-modify-write on a user record.
#[derive(Debug, Clone, PartialEq)]
pub enum UserUpdate {
    /// The closure changed the record and it was written back.
    Written(User),
    /// The closure declined the change; nothing was written.
    Unchanged(User),
}

impl UserUpdate {
    /// The record as stored after the update.
    #[must_use]
    pub fn user(&self) -> &User {
        match self {
            Self::Written(user) | Self::Unchanged(user) => user,
        }
    }

    /// Whether the record was written.
    #[must_use]
    pub fn is_written(&self) -> bool {
        matches!(self, Self::Written(_))
    }
}

/// The storage trait defining all database operations.
///
/// This trait abstracts the storage layer, allowing for different implementations
/// (e.g., `RocksDB`, instrumented wrappers in tests).
pub trait Store: Send + Sync {
    // =========================================================================
    // User Operations
    // =========================================================================

    /// Insert or replace a user record, maintaining the customer index.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_user(&self, user: &User) -> Result<()>;

    /// Insert a user record unless one with the same ID exists.
    ///
    /// Returns `false` when the user already exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn create_user(&self, user: &User) -> Result<bool>;

    /// Re-read a user and apply `apply` to the fresh record, writing it back
    /// only when `apply` returns `true`.
    ///
    /// The read and the write happen under the store's user write lock, so
    /// `apply` only overwrites the fields it sets.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the user does not exist, or an error
    /// if the database operation fails.
    fn modify_user(
        &self,
        user_id: &UserId,
        apply: &mut dyn FnMut(&mut User) -> bool,
    ) -> Result<UserUpdate>;

    /// Get a user by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_user(&self, user_id: &UserId) -> Result<Option<User>>;

    /// Get the user linked to a payment-processor customer ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn find_user_by_customer(&self, customer_id: &str) -> Result<Option<User>>;

    /// List every user.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_users(&self) -> Result<Vec<User>>;

    /// Apply `apply` to each of the given users, re-read under the user write
    /// lock, and write the changed records in one atomic batch.
    ///
    /// Unknown IDs are skipped. Returns the records that were written.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn modify_users(
        &self,
        user_ids: &[UserId],
        apply: &mut dyn FnMut(&mut User) -> bool,
    ) -> Result<Vec<User>>;

    // =========================================================================
    // Usage Log Operations
    // =========================================================================

    /// Append a usage log entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn append_usage_log(&self, log: &UsageLog) -> Result<()>;

    /// Count a user's logs for `action` created at or after `since`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn count_usage_since(
        &self,
        user_id: &UserId,
        action: MeteredAction,
        since: DateTime<Utc>,
    ) -> Result<u32>;

    /// Delete every usage log created before `cutoff`. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn delete_usage_logs_before(&self, cutoff: DateTime<Utc>) -> Result<usize>;

    // =========================================================================
    // Invoice Operations
    // =========================================================================

    /// Store an invoice unless one with the same upstream ID exists, allocating
    /// the next sequence number of the payment year.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn create_invoice_once(&self, draft: InvoiceDraft) -> Result<InvoiceOutcome>;

    /// Get an invoice by upstream ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_invoice(&self, stripe_invoice_id: &str) -> Result<Option<Invoice>>;

    /// List a user's invoices, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_invoices_by_user(&self, user_id: &UserId, limit: usize) -> Result<Vec<Invoice>>;
}

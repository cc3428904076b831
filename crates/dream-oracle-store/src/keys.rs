//! Key encoding utilities for `RocksDB`.
//!
//! Usage log keys are laid out so that one `(user, action)` pair occupies a
//! contiguous, time-ordered range:
//!
//! ```text
//! user_id (16) || action (1) || created_at millis (8, order-preserving) || log_id (16)
//! ```
//!
//! Counting a period's usage is a bounded forward scan from
//! `user_id || action || period_start`.

use chrono::{DateTime, Utc};

use dream_oracle_core::{InvoiceId, MeteredAction, UsageLog, UserId};

/// Length of a `user_id || action` prefix.
const USAGE_PREFIX_LEN: usize = 17;

/// Length of a full usage log key.
pub const USAGE_KEY_LEN: usize = USAGE_PREFIX_LEN + 8 + 16;

/// Create a user key from a user ID.
#[must_use]
pub fn user_key(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Create a customer index key.
#[must_use]
pub fn customer_key(customer_id: &str) -> Vec<u8> {
    customer_id.as_bytes().to_vec()
}

/// Encode a timestamp so that byte order matches time order, including
/// instants before the Unix epoch.
#[must_use]
#[allow(clippy::cast_sign_loss)]
pub fn encode_timestamp(at: DateTime<Utc>) -> [u8; 8] {
    ((at.timestamp_millis() as u64) ^ (1 << 63)).to_be_bytes()
}

/// Decode a timestamp written by [`encode_timestamp`] back to milliseconds.
#[must_use]
#[allow(clippy::cast_possible_wrap)]
pub fn decode_timestamp_millis(bytes: [u8; 8]) -> i64 {
    (u64::from_be_bytes(bytes) ^ (1 << 63)) as i64
}

/// Prefix shared by every log of one `(user, action)` pair.
#[must_use]
pub fn usage_prefix(user_id: &UserId, action: MeteredAction) -> Vec<u8> {
    let mut key = Vec::with_capacity(USAGE_PREFIX_LEN);
    key.extend_from_slice(user_id.as_bytes());
    key.push(action.code());
    key
}

/// First possible key at or after `since` for a `(user, action)` pair.
#[must_use]
pub fn usage_seek_key(user_id: &UserId, action: MeteredAction, since: DateTime<Utc>) -> Vec<u8> {
    let mut key = usage_prefix(user_id, action);
    key.extend_from_slice(&encode_timestamp(since));
    key
}

/// Full key of a usage log entry.
#[must_use]
pub fn usage_key(log: &UsageLog) -> Vec<u8> {
    let mut key = usage_seek_key(&log.user_id, log.action, log.created_at);
    key.extend_from_slice(&log.id.to_bytes());
    key
}

/// Extract the creation time (millis) from a full usage log key.
///
/// Returns `None` for keys of the wrong length.
#[must_use]
pub fn usage_key_timestamp_millis(key: &[u8]) -> Option<i64> {
    if key.len() != USAGE_KEY_LEN {
        return None;
    }
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&key[USAGE_PREFIX_LEN..USAGE_PREFIX_LEN + 8]);
    Some(decode_timestamp_millis(bytes))
}

/// Create an invoice key from an upstream invoice ID.
#[must_use]
pub fn invoice_key(stripe_invoice_id: &str) -> Vec<u8> {
    stripe_invoice_id.as_bytes().to_vec()
}

/// Create a user-invoice index key: `user_id (16) || invoice_id (16)`.
///
/// Invoice IDs are ULIDs, so a user's invoices sort by creation time.
#[must_use]
pub fn user_invoice_key(user_id: &UserId, invoice_id: &InvoiceId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(&invoice_id.to_bytes());
    key
}

/// Create a prefix for iterating all invoices of a user.
#[must_use]
pub fn user_invoices_prefix(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Create an invoice counter key for a year.
#[must_use]
pub fn counter_key(year: i32) -> [u8; 4] {
    year.to_be_bytes()
}

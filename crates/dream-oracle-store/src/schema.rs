//! Column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// User billing records, keyed by `user_id`.
    pub const USERS: &str = "users";

    /// Index: payment-processor customer ID to `user_id`.
    pub const USERS_BY_CUSTOMER: &str = "users_by_customer";

    /// Append-only usage logs, keyed by `user_id || action || created_at || log_id`.
    pub const USAGE_LOGS: &str = "usage_logs";

    /// Invoices, keyed by upstream invoice ID.
    pub const INVOICES: &str = "invoices";

    /// Index: invoices by user, keyed by `user_id || invoice_id`.
    /// Value is the upstream invoice ID.
    pub const INVOICES_BY_USER: &str = "invoices_by_user";

    /// Last allocated invoice sequence number per year.
    pub const INVOICE_COUNTERS: &str = "invoice_counters";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::USERS,
        cf::USERS_BY_CUSTOMER,
        cf::USAGE_LOGS,
        cf::INVOICES,
        cf::INVOICES_BY_USER,
        cf::INVOICE_COUNTERS,
    ]
}

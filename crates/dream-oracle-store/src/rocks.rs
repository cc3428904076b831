//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};

use dream_oracle_core::{Invoice, InvoiceDraft, MeteredAction, UsageLog, User, UserId};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::{InvoiceOutcome, Store, UserUpdate};

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    /// Serializes user writes so read-modify-write cycles never interleave.
    user_lock: Mutex<()>,
    /// Serializes invoice creation so dedup and numbering happen as one step.
    invoice_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            user_lock: Mutex::new(()),
            invoice_lock: Mutex::new(()),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn lock_users(&self) -> Result<MutexGuard<'_, ()>> {
        self.user_lock
            .lock()
            .map_err(|_| StoreError::Database("user lock poisoned".into()))
    }

    fn write(&self, batch: WriteBatch) -> Result<()> {
        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    /// Add a user record and its customer index entry to a batch.
    fn batch_put_user(&self, batch: &mut WriteBatch, user: &User) -> Result<()> {
        let cf_users = self.cf(cf::USERS)?;
        batch.put_cf(&cf_users, keys::user_key(&user.id), Self::serialize(user)?);

        if let Some(customer_id) = &user.stripe_customer_id {
            let cf_customers = self.cf(cf::USERS_BY_CUSTOMER)?;
            batch.put_cf(
                &cf_customers,
                keys::customer_key(customer_id),
                user.id.as_bytes(),
            );
        }

        Ok(())
    }
}

impl Store for RocksStore {
    // =========================================================================
    // User Operations
    // =========================================================================

    fn put_user(&self, user: &User) -> Result<()> {
        let _guard = self.lock_users()?;

        let mut batch = WriteBatch::default();
        self.batch_put_user(&mut batch, user)?;
        self.write(batch)
    }

    fn create_user(&self, user: &User) -> Result<bool> {
        let _guard = self.lock_users()?;

        if self.get_user(&user.id)?.is_some() {
            return Ok(false);
        }

        let mut batch = WriteBatch::default();
        self.batch_put_user(&mut batch, user)?;
        self.write(batch)?;
        Ok(true)
    }

    fn modify_user(
        &self,
        user_id: &UserId,
        apply: &mut dyn FnMut(&mut User) -> bool,
    ) -> Result<UserUpdate> {
        let _guard = self.lock_users()?;

        let mut user = self.get_user(user_id)?.ok_or_else(|| StoreError::NotFound {
            entity: "user",
            id: user_id.to_string(),
        })?;

        if !apply(&mut user) {
            return Ok(UserUpdate::Unchanged(user));
        }

        let mut batch = WriteBatch::default();
        self.batch_put_user(&mut batch, &user)?;
        self.write(batch)?;
        Ok(UserUpdate::Written(user))
    }

    fn get_user(&self, user_id: &UserId) -> Result<Option<User>> {
        let cf = self.cf(cf::USERS)?;

        self.db
            .get_cf(&cf, keys::user_key(user_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn find_user_by_customer(&self, customer_id: &str) -> Result<Option<User>> {
        let cf = self.cf(cf::USERS_BY_CUSTOMER)?;

        let Some(raw) = self
            .db
            .get_cf(&cf, keys::customer_key(customer_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
        else {
            return Ok(None);
        };

        let bytes: [u8; 16] = raw
            .as_slice()
            .try_into()
            .map_err(|_| StoreError::Serialization("malformed customer index entry".into()))?;

        // The index is never pruned; a customer re-linked to another user leaves a stale entry.
        Ok(self
            .get_user(&UserId::from_bytes(bytes))?
            .filter(|user| user.stripe_customer_id.as_deref() == Some(customer_id)))
    }

    fn list_users(&self) -> Result<Vec<User>> {
        let cf = self.cf(cf::USERS)?;

        self.db
            .iterator_cf(&cf, IteratorMode::Start)
            .map(|item| {
                let (_, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
                Self::deserialize(&value)
            })
            .collect()
    }

    fn modify_users(
        &self,
        user_ids: &[UserId],
        apply: &mut dyn FnMut(&mut User) -> bool,
    ) -> Result<Vec<User>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }

        let _guard = self.lock_users()?;

        let mut batch = WriteBatch::default();
        let mut written = Vec::new();
        for user_id in user_ids {
            let Some(mut user) = self.get_user(user_id)? else {
                continue;
            };
            if apply(&mut user) {
                self.batch_put_user(&mut batch, &user)?;
                written.push(user);
            }
        }

        if !written.is_empty() {
            self.write(batch)?;
        }
        Ok(written)
    }

    // =========================================================================
    // Usage Log Operations
    // =========================================================================

    fn append_usage_log(&self, log: &UsageLog) -> Result<()> {
        let cf = self.cf(cf::USAGE_LOGS)?;

        self.db
            .put_cf(&cf, keys::usage_key(log), Self::serialize(log)?)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn count_usage_since(
        &self,
        user_id: &UserId,
        action: MeteredAction,
        since: DateTime<Utc>,
    ) -> Result<u32> {
        let cf = self.cf(cf::USAGE_LOGS)?;
        let prefix = keys::usage_prefix(user_id, action);
        let seek = keys::usage_seek_key(user_id, action, since);
        let since_millis = since.timestamp_millis();

        let mut count: u32 = 0;
        for item in self
            .db
            .iterator_cf(&cf, IteratorMode::From(&seek, Direction::Forward))
        {
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;

            if !key.starts_with(&prefix) {
                break;
            }

            // Keys only carry millisecond precision; settle ties on the stored timestamp.
            if keys::usage_key_timestamp_millis(&key) == Some(since_millis) {
                let log: UsageLog = Self::deserialize(&value)?;
                if log.created_at < since {
                    continue;
                }
            }

            count = count.saturating_add(1);
        }

        Ok(count)
    }

    fn delete_usage_logs_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let cf = self.cf(cf::USAGE_LOGS)?;
        let cutoff_millis = cutoff.timestamp_millis();

        let mut batch = WriteBatch::default();
        let mut deleted = 0;

        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;

            if keys::usage_key_timestamp_millis(&key).is_some_and(|ts| ts < cutoff_millis) {
                batch.delete_cf(&cf, &key);
                deleted += 1;
            }
        }

        if deleted > 0 {
            self.db
                .write(batch)
                .map_err(|e| StoreError::Database(e.to_string()))?;
        }

        Ok(deleted)
    }

    // =========================================================================
    // Invoice Operations
    // =========================================================================

    fn create_invoice_once(&self, draft: InvoiceDraft) -> Result<InvoiceOutcome> {
        let _guard = self
            .invoice_lock
            .lock()
            .map_err(|_| StoreError::Database("invoice lock poisoned".into()))?;

        if let Some(existing) = self.get_invoice(&draft.stripe_invoice_id)? {
            return Ok(InvoiceOutcome::AlreadyExists(existing));
        }

        let cf_invoices = self.cf(cf::INVOICES)?;
        let cf_by_user = self.cf(cf::INVOICES_BY_USER)?;
        let cf_counters = self.cf(cf::INVOICE_COUNTERS)?;

        let counter_key = keys::counter_key(draft.year());
        let last = self
            .db
            .get_cf(&cf_counters, counter_key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|raw| Self::deserialize::<u32>(&raw))
            .transpose()?
            .unwrap_or(0);
        let sequence = last + 1;

        let invoice = draft.into_invoice(sequence, Utc::now());

        let mut batch = WriteBatch::default();
        batch.put_cf(
            &cf_invoices,
            keys::invoice_key(&invoice.stripe_invoice_id),
            Self::serialize(&invoice)?,
        );
        batch.put_cf(
            &cf_by_user,
            keys::user_invoice_key(&invoice.user_id, &invoice.id),
            invoice.stripe_invoice_id.as_bytes(),
        );
        batch.put_cf(&cf_counters, counter_key, Self::serialize(&sequence)?);

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(InvoiceOutcome::Created(invoice))
    }

    fn get_invoice(&self, stripe_invoice_id: &str) -> Result<Option<Invoice>> {
        let cf = self.cf(cf::INVOICES)?;

        self.db
            .get_cf(&cf, keys::invoice_key(stripe_invoice_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn list_invoices_by_user(&self, user_id: &UserId, limit: usize) -> Result<Vec<Invoice>> {
        let cf_by_user = self.cf(cf::INVOICES_BY_USER)?;
        let prefix = keys::user_invoices_prefix(user_id);

        // Collect index values first; ULID keys are already in creation order.
        let mut stripe_ids: Vec<Vec<u8>> = Vec::new();
        for item in self
            .db
            .iterator_cf(&cf_by_user, IteratorMode::From(&prefix, Direction::Forward))
        {
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;

            if !key.starts_with(&prefix) {
                break;
            }

            stripe_ids.push(value.to_vec());
        }

        let mut invoices = Vec::new();
        for raw in stripe_ids.into_iter().rev().take(limit) {
            let stripe_id = String::from_utf8(raw)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            if let Some(invoice) = self.get_invoice(&stripe_id)? {
                invoices.push(invoice);
            }
        }

        Ok(invoices)
    }
}

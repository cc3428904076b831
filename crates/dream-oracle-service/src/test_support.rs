//! Store wrapper that lets a test run a competing write in the middle of an
//! operation.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use dream_oracle_core::{Invoice, InvoiceDraft, MeteredAction, UsageLog, User, UserId};
use dream_oracle_store::{InvoiceOutcome, Result, RocksStore, Store, UserUpdate};

type Hook = Box<dyn FnOnce(&RocksStore) + Send>;

/// Delegates to a [`RocksStore`], running a one-shot hook right after the
/// next user lookup (`find_user_by_customer` or `list_users`) returns.
pub(crate) struct InterleavingStore {
    inner: Arc<RocksStore>,
    hook: Mutex<Option<Hook>>,
}

impl InterleavingStore {
    pub(crate) fn new(inner: Arc<RocksStore>) -> Self {
        Self {
            inner,
            hook: Mutex::new(None),
        }
    }

    /// Run `hook` against the underlying store after the next lookup.
    pub(crate) fn after_next_lookup(&self, hook: impl FnOnce(&RocksStore) + Send + 'static) {
        *self.hook.lock().unwrap() = Some(Box::new(hook));
    }

    fn interleave(&self) {
        let hook = self.hook.lock().unwrap().take();
        if let Some(hook) = hook {
            hook(&self.inner);
        }
    }
}

impl Store for InterleavingStore {
    fn put_user(&self, user: &User) -> Result<()> {
        self.inner.put_user(user)
    }
    fn create_user(&self, user: &User) -> Result<bool> {
        self.inner.create_user(user)
    }
    fn modify_user(
        &self,
        user_id: &UserId,
        apply: &mut dyn FnMut(&mut User) -> bool,
    ) -> Result<UserUpdate> {
        self.inner.modify_user(user_id, apply)
    }
    fn get_user(&self, user_id: &UserId) -> Result<Option<User>> {
        self.inner.get_user(user_id)
    }
    fn find_user_by_customer(&self, customer_id: &str) -> Result<Option<User>> {
        let found = self.inner.find_user_by_customer(customer_id)?;
        self.interleave();
        Ok(found)
    }
    fn list_users(&self) -> Result<Vec<User>> {
        let users = self.inner.list_users()?;
        self.interleave();
        Ok(users)
    }
    fn modify_users(
        &self,
        user_ids: &[UserId],
        apply: &mut dyn FnMut(&mut User) -> bool,
    ) -> Result<Vec<User>> {
        self.inner.modify_users(user_ids, apply)
    }
    fn append_usage_log(&self, log: &UsageLog) -> Result<()> {
        self.inner.append_usage_log(log)
    }
    fn count_usage_since(
        &self,
        user_id: &UserId,
        action: MeteredAction,
        since: DateTime<Utc>,
    ) -> Result<u32> {
        self.inner.count_usage_since(user_id, action, since)
    }
    fn delete_usage_logs_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        self.inner.delete_usage_logs_before(cutoff)
    }
    fn create_invoice_once(&self, draft: InvoiceDraft) -> Result<InvoiceOutcome> {
        self.inner.create_invoice_once(draft)
    }
    fn get_invoice(&self, stripe_invoice_id: &str) -> Result<Option<Invoice>> {
        self.inner.get_invoice(stripe_invoice_id)
    }
    fn list_invoices_by_user(&self, user_id: &UserId, limit: usize) -> Result<Vec<Invoice>> {
        self.inner.list_invoices_by_user(user_id, limit)
    }
}

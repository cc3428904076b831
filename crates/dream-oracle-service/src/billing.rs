//! Subscription reconciliation from Stripe webhook events.
//!
//! Every transition overwrites the fields it touches with values derived from
//! the event alone, using the event's `created` timestamp as "now". Replaying an
//! event therefore produces the same state, and the only non-idempotent effect
//! (invoice creation) is deduplicated by the upstream invoice ID.
//!
//! Each step re-reads the user under the store's user lock and touches only its
//! own fields, so concurrent deliveries for one user never undo each other.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use dream_oracle_core::{
    DomainError, InvoiceDraft, Result, SubscriptionStatus, Tier, User, UserId,
};
use dream_oracle_store::{InvoiceOutcome, Store};

use crate::stripe::{CheckoutSession, Invoice, PriceTierMap, Subscription};

/// What a reconciliation step did.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    /// The user's billing state was written.
    Applied,
    /// The subscription's price is not mapped to a tier; nothing was written.
    UnknownPrice(String),
    /// The event refers to a subscription the user no longer has; nothing was written.
    Stale,
    /// The event carried nothing to apply.
    Skipped,
    /// A payment was recorded; carries the (possibly pre-existing) invoice.
    Invoiced(InvoiceOutcome),
}

/// Applies Stripe subscription and invoice events to users.
#[derive(Clone)]
pub struct SubscriptionReconciler {
    store: Arc<dyn Store>,
    prices: PriceTierMap,
}

impl SubscriptionReconciler {
    /// Create a reconciler over a store and a price map.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, prices: PriceTierMap) -> Self {
        Self { store, prices }
    }

    /// Find the user an event belongs to: by `metadata.user_id` when present,
    /// else by Stripe customer ID.
    ///
    /// Returns `None` when `metadata.user_id` is not a valid user ID. Stripe
    /// would redeliver such an event forever, so callers acknowledge it.
    fn resolve_user_id(&self, user_ref: Option<&str>, customer: Option<&str>) -> Result<Option<UserId>> {
        if let Some(raw) = user_ref {
            return Ok(match raw.parse::<UserId>() {
                Ok(user_id) => Some(user_id),
                Err(e) => {
                    tracing::error!(user_ref = %raw, error = %e, "Malformed user reference in Stripe event, skipping");
                    None
                }
            });
        }

        let customer = customer.ok_or_else(|| DomainError::UserNotFound {
            user_id: "<no user reference or customer>".into(),
        })?;

        self.store
            .find_user_by_customer(customer)?
            .map(|user| Some(user.id))
            .ok_or_else(|| DomainError::UserNotFound {
                user_id: customer.to_string(),
            })
    }

    /// `checkout.session.completed`: link the Stripe customer to the user.
    ///
    /// The subscription itself is only recorded once its own event maps the
    /// price to a tier, so a completed checkout alone never counts as paid.
    pub fn link_checkout(
        &self,
        session: &CheckoutSession,
        at: DateTime<Utc>,
    ) -> Result<Reconciliation> {
        let Some(user_ref) = session.user_reference() else {
            tracing::warn!(session_id = %session.id, "Checkout session without user reference, skipping");
            return Ok(Reconciliation::Skipped);
        };
        let Some(customer) = session.customer.as_deref() else {
            tracing::warn!(session_id = %session.id, "Checkout session without customer, skipping");
            return Ok(Reconciliation::Skipped);
        };
        let Some(user_id) = self.resolve_user_id(Some(user_ref), None)? else {
            return Ok(Reconciliation::Skipped);
        };

        self.store.modify_user(&user_id, &mut |user: &mut User| {
            if user.stripe_customer_id.as_deref() == Some(customer) {
                return false;
            }
            user.stripe_customer_id = Some(customer.to_string());
            user.updated_at = at;
            true
        })?;

        tracing::info!(
            user_id = %user_id,
            session_id = %session.id,
            customer_id = %customer,
            subscription_id = ?session.subscription,
            "Checkout linked"
        );

        Ok(Reconciliation::Applied)
    }

    /// `customer.subscription.created` / `customer.subscription.updated`.
    ///
    /// Sets tier, status, period end and subscription identifiers, and starts a
    /// fresh metering window. An unmapped price leaves the user untouched.
    pub fn apply_subscription(
        &self,
        subscription: &Subscription,
        at: DateTime<Utc>,
    ) -> Result<Reconciliation> {
        let Some(user_id) = self.resolve_user_id(
            subscription.metadata.get("user_id").map(String::as_str),
            subscription.customer.as_deref(),
        )?
        else {
            return Ok(Reconciliation::Skipped);
        };

        let price_id = subscription.price_id().unwrap_or_default();
        let tier = match self.prices.tier_for(price_id) {
            Ok(tier) => tier,
            Err(e) => {
                tracing::error!(
                    user_id = %user_id,
                    subscription_id = %subscription.id,
                    price_id = %price_id,
                    error = %e,
                    "Unmapped Stripe price, subscription not applied"
                );
                return Ok(Reconciliation::UnknownPrice(price_id.to_string()));
            }
        };

        let status = SubscriptionStatus::from_stripe(&subscription.status);
        let ends = subscription.period_end();

        self.store.modify_user(&user_id, &mut |user: &mut User| {
            user.subscription_tier = tier;
            user.subscription_status = status;
            user.subscription_ends = ends;
            user.stripe_subscription_id = Some(subscription.id.clone());
            if let Some(customer) = &subscription.customer {
                user.stripe_customer_id = Some(customer.clone());
            }
            user.credits_reset_at = Some(at);
            user.updated_at = at;
            true
        })?;

        tracing::info!(
            user_id = %user_id,
            subscription_id = %subscription.id,
            tier = %tier,
            status = %status,
            "Subscription applied"
        );

        Ok(Reconciliation::Applied)
    }

    /// `customer.subscription.deleted`: downgrade to FREE.
    ///
    /// The metering window is kept, so usage already counted applies against the
    /// FREE limits. The customer link is kept for later events.
    pub fn cancel_subscription(
        &self,
        subscription: &Subscription,
        at: DateTime<Utc>,
    ) -> Result<Reconciliation> {
        let Some(user_id) = self.resolve_user_id(
            subscription.metadata.get("user_id").map(String::as_str),
            subscription.customer.as_deref(),
        )?
        else {
            return Ok(Reconciliation::Skipped);
        };

        let update = self.store.modify_user(&user_id, &mut |user: &mut User| {
            if user
                .stripe_subscription_id
                .as_deref()
                .is_some_and(|current| current != subscription.id)
            {
                return false;
            }
            user.subscription_tier = Tier::Free;
            user.subscription_status = SubscriptionStatus::Canceled;
            user.subscription_ends = None;
            user.stripe_subscription_id = None;
            user.updated_at = at;
            true
        })?;

        if !update.is_written() {
            tracing::info!(
                user_id = %user_id,
                subscription_id = %subscription.id,
                current = ?update.user().stripe_subscription_id,
                "Deletion of a replaced subscription, ignoring"
            );
            return Ok(Reconciliation::Stale);
        }

        tracing::info!(user_id = %user_id, subscription_id = %subscription.id, "Subscription canceled");
        Ok(Reconciliation::Applied)
    }

    /// `invoice.payment_failed`: mark past due, keeping the tier as a grace period.
    pub fn payment_failed(&self, invoice: &Invoice, at: DateTime<Utc>) -> Result<Reconciliation> {
        let Some(user_id) = self.resolve_user_id(
            invoice.metadata.get("user_id").map(String::as_str),
            invoice.customer.as_deref(),
        )?
        else {
            return Ok(Reconciliation::Skipped);
        };

        let update = self.store.modify_user(&user_id, &mut |user: &mut User| {
            user.subscription_status = SubscriptionStatus::PastDue;
            user.updated_at = at;
            true
        })?;

        tracing::warn!(
            user_id = %user_id,
            invoice_id = %invoice.id,
            tier = %update.user().subscription_tier,
            "Payment failed, subscription past due"
        );

        Ok(Reconciliation::Applied)
    }

    /// `invoice.payment_succeeded`: restore a past-due subscription and record
    /// the invoice exactly once.
    pub fn payment_succeeded(&self, invoice: &Invoice, at: DateTime<Utc>) -> Result<Reconciliation> {
        let Some(user_id) = self.resolve_user_id(
            invoice.metadata.get("user_id").map(String::as_str),
            invoice.customer.as_deref(),
        )?
        else {
            return Ok(Reconciliation::Skipped);
        };

        let update = self.store.modify_user(&user_id, &mut |user: &mut User| {
            if user.subscription_status != SubscriptionStatus::PastDue {
                return false;
            }
            user.subscription_status = SubscriptionStatus::Active;
            user.updated_at = at;
            true
        })?;
        if update.is_written() {
            tracing::info!(user_id = %user_id, invoice_id = %invoice.id, "Past-due subscription restored");
        }

        let outcome = self.store.create_invoice_once(InvoiceDraft {
            user_id,
            stripe_invoice_id: invoice.id.clone(),
            amount: invoice.amount_paid,
            currency: invoice.currency.clone(),
            paid_at: invoice.paid_at().unwrap_or(at),
        })?;

        match &outcome {
            InvoiceOutcome::Created(created) => tracing::info!(
                user_id = %user_id,
                invoice_number = %created.invoice_number,
                stripe_invoice_id = %created.stripe_invoice_id,
                amount = created.amount,
                "Invoice created"
            ),
            InvoiceOutcome::AlreadyExists(existing) => tracing::debug!(
                invoice_number = %existing.invoice_number,
                stripe_invoice_id = %existing.stripe_invoice_id,
                "Invoice already recorded"
            ),
        }

        Ok(Reconciliation::Invoiced(outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use dream_oracle_core::{MeteredAction, TierLimits};
    use dream_oracle_store::RocksStore;
    use serde_json::json;
    use tempfile::TempDir;

    use crate::metering::UsageMeter;
    use crate::test_support::InterleavingStore;

    fn setup() -> (SubscriptionReconciler, Arc<RocksStore>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        let prices = PriceTierMap::new(&["price_essential".into()], &["price_premium".into()]);
        (SubscriptionReconciler::new(store.clone(), prices), store, dir)
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn linked_user(store: &RocksStore) -> User {
        let mut user = User::register(UserId::generate(), at() - Duration::days(3), 7);
        user.stripe_customer_id = Some("cus_1".into());
        store.put_user(&user).unwrap();
        user
    }

    fn subscription(price: &str, status: &str) -> Subscription {
        serde_json::from_value(json!({
            "id": "sub_1",
            "customer": "cus_1",
            "status": status,
            "current_period_end": 1_720_000_000,
            "items": {"data": [{"price": {"id": price}}]}
        }))
        .unwrap()
    }

    fn invoice(id: &str) -> Invoice {
        serde_json::from_value(json!({
            "id": id,
            "customer": "cus_1",
            "amount_paid": 1199,
            "currency": "eur",
            "status_transitions": {"paid_at": 1_717_243_200}
        }))
        .unwrap()
    }

    fn invoice_for(user_ref: &str) -> Invoice {
        serde_json::from_value(json!({
            "id": "in_ref",
            "customer": "cus_1",
            "amount_paid": 1199,
            "currency": "eur",
            "metadata": {"user_id": user_ref}
        }))
        .unwrap()
    }

    #[test]
    fn subscription_update_sets_tier_and_resets_window() {
        let (reconciler, store, _dir) = setup();
        let user = linked_user(&store);

        let outcome = reconciler
            .apply_subscription(&subscription("price_essential", "active"), at())
            .unwrap();
        assert_eq!(outcome, Reconciliation::Applied);

        let stored = store.get_user(&user.id).unwrap().unwrap();
        assert_eq!(stored.subscription_tier, Tier::Essential);
        assert_eq!(stored.subscription_status, SubscriptionStatus::Active);
        assert_eq!(stored.stripe_subscription_id.as_deref(), Some("sub_1"));
        assert_eq!(stored.credits_reset_at, Some(at()));
        assert_eq!(stored.subscription_ends.map(|d| d.timestamp()), Some(1_720_000_000));
    }

    #[test]
    fn replayed_update_is_idempotent() {
        let (reconciler, store, _dir) = setup();
        let user = linked_user(&store);
        let event = subscription("price_premium", "trialing");

        reconciler.apply_subscription(&event, at()).unwrap();
        let once = store.get_user(&user.id).unwrap().unwrap();
        reconciler.apply_subscription(&event, at()).unwrap();
        let twice = store.get_user(&user.id).unwrap().unwrap();

        assert_eq!(once, twice);
    }

    #[test]
    fn unknown_price_leaves_user_untouched() {
        let (reconciler, store, _dir) = setup();
        let user = linked_user(&store);

        let outcome = reconciler
            .apply_subscription(&subscription("price_mystery", "active"), at())
            .unwrap();

        assert_eq!(outcome, Reconciliation::UnknownPrice("price_mystery".into()));
        assert_eq!(store.get_user(&user.id).unwrap().unwrap(), user);
    }

    #[test]
    fn deletion_downgrades_without_resetting_window() {
        let (reconciler, store, _dir) = setup();
        let user = linked_user(&store);
        reconciler
            .apply_subscription(&subscription("price_premium", "active"), at())
            .unwrap();

        let later = at() + Duration::days(10);
        reconciler
            .cancel_subscription(&subscription("price_premium", "canceled"), later)
            .unwrap();

        let stored = store.get_user(&user.id).unwrap().unwrap();
        assert_eq!(stored.subscription_tier, Tier::Free);
        assert_eq!(stored.subscription_status, SubscriptionStatus::Canceled);
        assert_eq!(stored.stripe_subscription_id, None);
        assert_eq!(stored.subscription_ends, None);
        assert_eq!(stored.credits_reset_at, Some(at()));
        assert_eq!(stored.stripe_customer_id.as_deref(), Some("cus_1"));
    }

    #[test]
    fn deletion_of_replaced_subscription_is_stale() {
        let (reconciler, store, _dir) = setup();
        let mut user = linked_user(&store);
        user.stripe_subscription_id = Some("sub_2".into());
        user.subscription_tier = Tier::Essential;
        store.put_user(&user).unwrap();

        let outcome = reconciler
            .cancel_subscription(&subscription("price_premium", "canceled"), at())
            .unwrap();

        assert_eq!(outcome, Reconciliation::Stale);
        assert_eq!(
            store.get_user(&user.id).unwrap().unwrap().subscription_tier,
            Tier::Essential
        );
    }

    #[test]
    fn payment_failure_then_success() {
        let (reconciler, store, _dir) = setup();
        let user = linked_user(&store);
        reconciler
            .apply_subscription(&subscription("price_essential", "active"), at())
            .unwrap();

        reconciler.payment_failed(&invoice("in_1"), at()).unwrap();
        let failed = store.get_user(&user.id).unwrap().unwrap();
        assert_eq!(failed.subscription_status, SubscriptionStatus::PastDue);
        assert_eq!(failed.subscription_tier, Tier::Essential);

        let outcome = reconciler.payment_succeeded(&invoice("in_1"), at()).unwrap();
        let Reconciliation::Invoiced(InvoiceOutcome::Created(created)) = outcome else {
            panic!("expected a new invoice");
        };
        assert_eq!(created.invoice_number, "DO-2024-0001");
        assert_eq!(created.amount_ht, 999);
        assert_eq!(created.tva, 200);
        assert_eq!(
            store.get_user(&user.id).unwrap().unwrap().subscription_status,
            SubscriptionStatus::Active
        );
    }

    #[test]
    fn replayed_payment_creates_one_invoice() {
        let (reconciler, store, _dir) = setup();
        let user = linked_user(&store);

        reconciler.payment_succeeded(&invoice("in_1"), at()).unwrap();
        let replay = reconciler.payment_succeeded(&invoice("in_1"), at()).unwrap();

        assert!(matches!(
            replay,
            Reconciliation::Invoiced(InvoiceOutcome::AlreadyExists(_))
        ));
        assert_eq!(store.list_invoices_by_user(&user.id, 10).unwrap().len(), 1);
    }

    #[test]
    fn unknown_customer_is_not_found() {
        let (reconciler, _store, _dir) = setup();

        assert!(matches!(
            reconciler.apply_subscription(&subscription("price_essential", "active"), at()),
            Err(DomainError::UserNotFound { .. })
        ));
    }

    fn checkout(user_id: &UserId) -> CheckoutSession {
        serde_json::from_value(json!({
            "id": "cs_1",
            "customer": "cus_9",
            "subscription": "sub_9",
            "client_reference_id": user_id.to_string()
        }))
        .unwrap()
    }

    #[test]
    fn checkout_links_customer_only() {
        let (reconciler, store, _dir) = setup();
        let user = User::register(UserId::generate(), at(), 7);
        store.put_user(&user).unwrap();

        reconciler.link_checkout(&checkout(&user.id), at()).unwrap();

        let stored = store.find_user_by_customer("cus_9").unwrap().unwrap();
        assert_eq!(stored.id, user.id);
        assert_eq!(stored.stripe_subscription_id, None);
        assert!(!stored.has_paid_subscription());
    }

    #[test]
    fn checkout_with_unmapped_price_does_not_extend_trial() {
        let (reconciler, store, _dir) = setup();
        let user = User::register(UserId::generate(), at(), 7);
        store.put_user(&user).unwrap();

        reconciler.link_checkout(&checkout(&user.id), at()).unwrap();
        let mut unmapped = subscription("price_mystery", "active");
        unmapped.customer = Some("cus_9".into());
        reconciler.apply_subscription(&unmapped, at()).unwrap();

        let later = at() + Duration::days(8);
        let stored = store.get_user(&user.id).unwrap().unwrap();
        assert_eq!(stored.effective_tier(later), Tier::Free);
        assert!(stored.trial_expired(later));

        let meter = UsageMeter::new(store.clone(), TierLimits::default());
        let check = meter
            .check_user(&stored, MeteredAction::Transcription, later)
            .unwrap();
        assert_eq!(check.tier, Tier::Free);
        assert!(!check.allowed);
    }

    #[test]
    fn malformed_user_reference_is_skipped() {
        let (reconciler, store, _dir) = setup();
        let user = linked_user(&store);
        let mut event = subscription("price_essential", "active");
        event.metadata.insert("user_id".into(), "not-a-uuid".into());

        let outcome = reconciler.apply_subscription(&event, at()).unwrap();

        assert_eq!(outcome, Reconciliation::Skipped);
        assert_eq!(store.get_user(&user.id).unwrap().unwrap(), user);
        assert_eq!(
            reconciler.payment_failed(&invoice_for("not-a-uuid"), at()).unwrap(),
            Reconciliation::Skipped
        );
    }

    #[test]
    fn concurrent_events_for_one_user_both_apply() {
        let dir = TempDir::new().unwrap();
        let rocks = Arc::new(RocksStore::open(dir.path()).unwrap());
        let store = Arc::new(InterleavingStore::new(rocks.clone()));
        let prices = PriceTierMap::new(&["price_essential".into()], &["price_premium".into()]);
        let reconciler = SubscriptionReconciler::new(store.clone(), prices.clone());
        let user = linked_user(&rocks);

        // A subscription update lands between the payment failure's lookup and its write.
        let competing = SubscriptionReconciler::new(rocks.clone(), prices);
        store.after_next_lookup(move |_| {
            competing
                .apply_subscription(&subscription("price_essential", "active"), at())
                .unwrap();
        });
        reconciler.payment_failed(&invoice("in_1"), at()).unwrap();

        let stored = rocks.get_user(&user.id).unwrap().unwrap();
        assert_eq!(stored.subscription_tier, Tier::Essential);
        assert_eq!(stored.stripe_subscription_id.as_deref(), Some("sub_1"));
        assert_eq!(stored.subscription_status, SubscriptionStatus::PastDue);
    }
}

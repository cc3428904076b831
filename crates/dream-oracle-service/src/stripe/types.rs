//! Stripe webhook payload types.
//!
//! Only the fields reconciliation reads are modeled; everything else in the
//! payload is ignored.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Stripe webhook event envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    /// Event ID.
    pub id: String,
    /// Event type (e.g., "customer.subscription.updated").
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event data.
    pub data: WebhookEventData,
    /// Created timestamp (Unix).
    pub created: i64,
}

impl WebhookEvent {
    /// The classified event type.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        EventKind::from(self.event_type.as_str())
    }

    /// When Stripe created the event. Replays of one event carry the same value.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        unix_to_datetime(self.created).unwrap_or_else(Utc::now)
    }
}

/// Webhook event data container.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEventData {
    /// The event object.
    pub object: serde_json::Value,
}

/// Webhook event types we handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// `checkout.session.completed`
    CheckoutSessionCompleted,
    /// `customer.subscription.created`
    SubscriptionCreated,
    /// `customer.subscription.updated`
    SubscriptionUpdated,
    /// `customer.subscription.deleted`
    SubscriptionDeleted,
    /// `invoice.payment_failed`
    InvoicePaymentFailed,
    /// `invoice.payment_succeeded`
    InvoicePaymentSucceeded,
    /// Anything else; acknowledged and ignored.
    Other(String),
}

impl From<&str> for EventKind {
    fn from(s: &str) -> Self {
        match s {
            "checkout.session.completed" => Self::CheckoutSessionCompleted,
            "customer.subscription.created" => Self::SubscriptionCreated,
            "customer.subscription.updated" => Self::SubscriptionUpdated,
            "customer.subscription.deleted" => Self::SubscriptionDeleted,
            "invoice.payment_failed" => Self::InvoicePaymentFailed,
            "invoice.payment_succeeded" => Self::InvoicePaymentSucceeded,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Stripe Checkout session object.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    /// Session ID.
    pub id: String,
    /// Customer ID.
    #[serde(default)]
    pub customer: Option<String>,
    /// Subscription ID (subscription-mode sessions).
    #[serde(default)]
    pub subscription: Option<String>,
    /// Client reference ID (our `user_id`).
    #[serde(default)]
    pub client_reference_id: Option<String>,
    /// Metadata.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl CheckoutSession {
    /// The user the session was opened for.
    #[must_use]
    pub fn user_reference(&self) -> Option<&str> {
        self.client_reference_id
            .as_deref()
            .or_else(|| self.metadata.get("user_id").map(String::as_str))
    }
}

/// Stripe subscription object.
#[derive(Debug, Clone, Deserialize)]
pub struct Subscription {
    /// Subscription ID.
    pub id: String,
    /// Customer ID.
    #[serde(default)]
    pub customer: Option<String>,
    /// Upstream status (active, trialing, past_due, ...).
    #[serde(default)]
    pub status: String,
    /// End of the current period (Unix).
    #[serde(default)]
    pub current_period_end: Option<i64>,
    /// Subscription items.
    #[serde(default)]
    pub items: SubscriptionItems,
    /// Metadata.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Subscription {
    /// Price ID of the first subscription item.
    #[must_use]
    pub fn price_id(&self) -> Option<&str> {
        self.items.data.first().map(|item| item.price.id.as_str())
    }

    /// End of the current period.
    #[must_use]
    pub fn period_end(&self) -> Option<DateTime<Utc>> {
        self.current_period_end.and_then(unix_to_datetime)
    }
}

/// Subscription item list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionItems {
    /// Items.
    #[serde(default)]
    pub data: Vec<SubscriptionItem>,
}

/// One subscription item.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionItem {
    /// The subscribed price.
    pub price: Price,
}

/// Stripe price reference.
#[derive(Debug, Clone, Deserialize)]
pub struct Price {
    /// Price ID.
    pub id: String,
}

/// Stripe invoice object.
#[derive(Debug, Clone, Deserialize)]
pub struct Invoice {
    /// Invoice ID.
    pub id: String,
    /// Customer ID.
    #[serde(default)]
    pub customer: Option<String>,
    /// Subscription ID.
    #[serde(default)]
    pub subscription: Option<String>,
    /// Amount paid, tax included, in minor units.
    #[serde(default)]
    pub amount_paid: i64,
    /// Currency (e.g., "eur").
    #[serde(default)]
    pub currency: String,
    /// Status timestamps.
    #[serde(default)]
    pub status_transitions: StatusTransitions,
    /// Metadata.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Invoice {
    /// When the invoice was paid, if reported.
    #[must_use]
    pub fn paid_at(&self) -> Option<DateTime<Utc>> {
        self.status_transitions.paid_at.and_then(unix_to_datetime)
    }
}

/// Invoice status timestamps.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusTransitions {
    /// Payment time (Unix).
    #[serde(default)]
    pub paid_at: Option<i64>,
}

/// Webhook response.
#[derive(Debug, serde::Serialize)]
pub struct WebhookResponse {
    /// Whether the webhook was accepted.
    pub received: bool,
}

fn unix_to_datetime(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_kind_classification() {
        assert_eq!(
            EventKind::from("customer.subscription.deleted"),
            EventKind::SubscriptionDeleted
        );
        assert_eq!(
            EventKind::from("charge.refunded"),
            EventKind::Other("charge.refunded".into())
        );
    }

    #[test]
    fn subscription_reads_first_price() {
        let sub: Subscription = serde_json::from_value(json!({
            "id": "sub_1",
            "customer": "cus_1",
            "status": "active",
            "current_period_end": 1_717_200_000,
            "items": {"data": [{"price": {"id": "price_premium"}}, {"price": {"id": "price_addon"}}]}
        }))
        .unwrap();

        assert_eq!(sub.price_id(), Some("price_premium"));
        assert_eq!(sub.period_end().map(|d| d.timestamp()), Some(1_717_200_000));
        assert!(sub.metadata.is_empty());
    }

    #[test]
    fn checkout_prefers_client_reference() {
        let session: CheckoutSession = serde_json::from_value(json!({
            "id": "cs_1",
            "client_reference_id": "a",
            "metadata": {"user_id": "b"}
        }))
        .unwrap();
        assert_eq!(session.user_reference(), Some("a"));

        let session: CheckoutSession = serde_json::from_value(json!({
            "id": "cs_2",
            "metadata": {"user_id": "b"}
        }))
        .unwrap();
        assert_eq!(session.user_reference(), Some("b"));
    }
}

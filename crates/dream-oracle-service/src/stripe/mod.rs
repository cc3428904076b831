//! Stripe integration: webhook signature verification and price-to-tier mapping.

pub mod types;

use std::collections::HashMap;

use dream_oracle_core::{DomainError, Tier};

use crate::crypto::{constant_time_eq, hmac_sha256_hex};

pub use types::{CheckoutSession, EventKind, Invoice, Subscription, WebhookEvent, WebhookResponse};

/// Stripe webhook verification errors.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    /// The header carries no `t=` element.
    #[error("missing timestamp in signature header")]
    MissingTimestamp,

    /// The header carries no `v1=` element.
    #[error("missing v1 signature in signature header")]
    MissingSignature,

    /// No `v1` signature matches the payload.
    #[error("invalid signature")]
    Mismatch,
}

/// Verify a `Stripe-Signature` header against the raw request body.
///
/// The header has the form `t=timestamp,v1=signature[,v1=signature...]`; the
/// signed payload is `"{timestamp}.{body}"`.
pub fn verify_webhook_signature(
    secret: &str,
    payload: &str,
    header: &str,
) -> Result<(), SignatureError> {
    let mut timestamp: Option<&str> = None;
    let mut signatures: Vec<&str> = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", ts)) => timestamp = Some(ts),
            Some(("v1", sig)) => signatures.push(sig),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::MissingTimestamp)?;
    if signatures.is_empty() {
        return Err(SignatureError::MissingSignature);
    }

    let expected = hmac_sha256_hex(secret, &format!("{timestamp}.{payload}"));

    if signatures.iter().any(|sig| constant_time_eq(&expected, sig)) {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Build a `Stripe-Signature` header value for a payload, as Stripe would.
#[must_use]
pub fn sign_payload(secret: &str, timestamp: i64, payload: &str) -> String {
    let signature = hmac_sha256_hex(secret, &format!("{timestamp}.{payload}"));
    format!("t={timestamp},v1={signature}")
}

/// Maps Stripe price IDs to subscription tiers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PriceTierMap {
    prices: HashMap<String, Tier>,
}

impl PriceTierMap {
    /// Build the map from per-tier price ID lists.
    #[must_use]
    pub fn new(essential: &[String], premium: &[String]) -> Self {
        let mut map = Self::default();
        for price in essential {
            map.insert(price.clone(), Tier::Essential);
        }
        for price in premium {
            map.insert(price.clone(), Tier::Premium);
        }
        map
    }

    /// Map one more price ID.
    pub fn insert(&mut self, price_id: impl Into<String>, tier: Tier) {
        self.prices.insert(price_id.into(), tier);
    }

    /// Resolve the tier sold by a price.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::UnknownPriceId`] if the price is not mapped.
    pub fn tier_for(&self, price_id: &str) -> Result<Tier, DomainError> {
        self.prices
            .get(price_id)
            .copied()
            .ok_or_else(|| DomainError::UnknownPriceId {
                price_id: price_id.to_string(),
            })
    }

    /// Number of mapped prices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.prices.len()
    }

    /// Whether no price is mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

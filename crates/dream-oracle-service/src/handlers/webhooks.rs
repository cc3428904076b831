//! Stripe webhook handler.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::de::DeserializeOwned;

use crate::billing::Reconciliation;
use crate::error::ApiError;
use crate::state::AppState;
use crate::stripe::{verify_webhook_signature, EventKind, WebhookEvent, WebhookResponse};

/// Handle Stripe webhooks.
///
/// Events for users that cannot be resolved yet fail with `404` so Stripe
/// redelivers them; unmapped prices and unhandled types are acknowledged.
pub async fn stripe_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookResponse>, ApiError> {
    // Verify signature if webhook_secret is configured
    if let Some(webhook_secret) = &state.config.stripe_webhook_secret {
        let signature = headers
            .get("stripe-signature")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::BadRequest("Missing Stripe signature".into()))?;

        verify_webhook_signature(webhook_secret, &body, signature).map_err(|e| {
            tracing::warn!(error = %e, "Invalid Stripe webhook signature");
            ApiError::BadRequest("Invalid webhook signature".into())
        })?;
    }

    // Parse webhook payload
    let event: WebhookEvent =
        serde_json::from_str(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    tracing::info!(
        event_type = %event.event_type,
        event_id = %event.id,
        "Received Stripe webhook"
    );

    let at = event.created_at();
    let reconciler = &state.reconciler;

    let outcome = match event.kind() {
        EventKind::CheckoutSessionCompleted => reconciler.link_checkout(&object(&event)?, at)?,
        EventKind::SubscriptionCreated | EventKind::SubscriptionUpdated => {
            reconciler.apply_subscription(&object(&event)?, at)?
        }
        EventKind::SubscriptionDeleted => reconciler.cancel_subscription(&object(&event)?, at)?,
        EventKind::InvoicePaymentFailed => reconciler.payment_failed(&object(&event)?, at)?,
        EventKind::InvoicePaymentSucceeded => reconciler.payment_succeeded(&object(&event)?, at)?,
        EventKind::Other(event_type) => {
            tracing::debug!(event_type = %event_type, "Unhandled Stripe event");
            Reconciliation::Skipped
        }
    };

    tracing::debug!(event_id = %event.id, outcome = ?outcome, "Stripe webhook processed");

    Ok(Json(WebhookResponse { received: true }))
}

/// Decode the event's data object.
fn object<T: DeserializeOwned>(event: &WebhookEvent) -> Result<T, ApiError> {
    serde_json::from_value(event.data.object.clone()).map_err(|e| {
        tracing::warn!(event_id = %event.id, error = %e, "Malformed Stripe event object");
        ApiError::BadRequest(format!("Malformed event object: {e}"))
    })
}

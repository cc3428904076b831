//! Application state.

use std::sync::Arc;

use dream_oracle_store::Store;

use crate::billing::SubscriptionReconciler;
use crate::config::ServiceConfig;
use crate::metering::UsageMeter;
use crate::rate_limit::UserRateLimiter;

/// Application state shared across handlers.
pub struct AppState {
    /// The storage backend.
    pub store: Arc<dyn Store>,

    /// Service configuration.
    pub config: ServiceConfig,

    /// Usage meter over the configured tier limits.
    pub meter: UsageMeter,

    /// Stripe event reconciler over the configured price map.
    pub reconciler: SubscriptionReconciler,

    /// Per-user request rate limiter.
    pub rate_limiter: UserRateLimiter,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: ServiceConfig) -> Self {
        if config.stripe_webhook_secret.is_none() {
            tracing::warn!("Stripe webhook secret not configured - signatures will not be verified");
        }
        if config.stripe_prices.is_empty() {
            tracing::warn!("No Stripe prices configured - subscription events will not be applied");
        }
        if config.jwt_secret.is_none() {
            tracing::warn!("JWT secret not configured - user requests will be rejected");
        }

        let meter = UsageMeter::new(store.clone(), config.tier_limits.clone());
        let reconciler = SubscriptionReconciler::new(store.clone(), config.stripe_prices.clone());
        let rate_limiter = UserRateLimiter::per_minute(config.rate_limit_per_minute);

        Self {
            store,
            config,
            meter,
            reconciler,
            rate_limiter,
        }
    }
}

//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post, put};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{accounts, biorhythm, health, invoices, jobs, usage, webhooks};
use crate::state::AppState;

// ============================================================================
// Concurrency Limiting Constants
// ============================================================================

/// Maximum concurrent requests for the service-to-service metering endpoints.
const METERING_MAX_CONCURRENT_REQUESTS: usize = 100;

/// Maximum concurrent requests for general API endpoints.
const API_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## Accounts (JWT auth, rate-limited per user)
/// - `POST /v1/accounts` - Register on a trial
/// - `GET /v1/accounts/me` - Billing state, effective tier and trial
/// - `PUT /v1/accounts/me/birth-date` - Set birth date
///
/// ## Usage
/// - `GET /v1/usage` - Current window usage (JWT auth)
/// - `POST /v1/usage/check` - Limit check (service API key)
/// - `POST /v1/usage/record` - Record a completed action (service API key)
///
/// ## Invoices and biorhythms (JWT auth)
/// - `GET /v1/invoices`
/// - `GET /v1/biorhythm`, `GET /v1/biorhythm/range`, `GET /v1/biorhythm/critical`
///
/// ## Jobs (cron secret)
/// - `POST /jobs/expire-trials`
/// - `POST /jobs/cleanup`
///
/// ## Webhooks (Signature verification)
/// - `POST /webhooks/stripe` - Stripe webhooks
pub fn create_router(state: AppState) -> Router {
    // Extract config values before moving state
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    let metering_routes = Router::new()
        .route("/check", post(usage::check_usage))
        .route("/record", post(usage::record_usage))
        .layer(ConcurrencyLimitLayer::new(METERING_MAX_CONCURRENT_REQUESTS));

    let api_routes = Router::new()
        // Accounts
        .route("/accounts", post(accounts::create_account))
        .route("/accounts/me", get(accounts::get_account))
        .route("/accounts/me/birth-date", put(accounts::set_birth_date))
        // Usage
        .route("/usage", get(usage::get_usage))
        // Invoices
        .route("/invoices", get(invoices::list_invoices))
        // Biorhythms
        .route("/biorhythm", get(biorhythm::get_biorhythm))
        .route("/biorhythm/range", get(biorhythm::get_range))
        .route("/biorhythm/critical", get(biorhythm::get_critical_days))
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS))
        // Metering routes (with their own concurrency limit)
        .nest("/usage", metering_routes);

    let job_routes = Router::new()
        .route("/expire-trials", post(jobs::expire_trials))
        .route("/cleanup", post(jobs::cleanup));

    Router::new()
        // Health (public, no rate limit)
        .route("/health", get(health::health))
        .nest("/v1", api_routes)
        .nest("/jobs", job_routes)
        // Webhooks (no rate limit - controlled by Stripe)
        .route("/webhooks/stripe", post(webhooks::stripe_webhook))
        // Global middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

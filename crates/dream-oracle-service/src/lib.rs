//! DreamOracle HTTP API Service.
//!
//! This crate provides the HTTP API around the DreamOracle core, including:
//!
//! - Account registration and billing state
//! - Usage metering against per-tier quotas
//! - Stripe webhook reconciliation and invoices
//! - Scheduled jobs (trial expiration, usage log retention)
//! - Biorhythm readings
//!
//! # Authentication
//!
//! The service supports three authentication methods:
//!
//! 1. **HS256 JWT tokens** - For end-user requests
//! 2. **Service API keys** - For the app's action handlers calling the meter
//! 3. **Cron secret** - For the scheduler triggering batch jobs

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers over the sync store are still async

pub mod auth;
pub mod billing;
pub mod config;
pub mod crypto;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod metering;
pub mod rate_limit;
pub mod routes;
pub mod state;
pub mod stripe;

#[cfg(test)]
mod test_support;

pub use billing::{Reconciliation, SubscriptionReconciler};
pub use config::ServiceConfig;
pub use error::ApiError;
pub use metering::{MeteredError, UsageMeter};
pub use rate_limit::UserRateLimiter;
pub use routes::create_router;
pub use state::AppState;
pub use stripe::PriceTierMap;

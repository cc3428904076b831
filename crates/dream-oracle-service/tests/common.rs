//! Common test utilities for dream-oracle integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderName, HeaderValue};
use axum::Router;
use axum_test::TestServer;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tempfile::TempDir;

use dream_oracle_core::{Tier, User, UserId};
use dream_oracle_service::{create_router, AppState, PriceTierMap, ServiceConfig};
use dream_oracle_store::{RocksStore, Store};

/// Webhook signing secret used by the harness.
pub const WEBHOOK_SECRET: &str = "whsec_test";

/// Price IDs mapped by the harness.
pub const PRICE_ESSENTIAL: &str = "price_essential_monthly";
pub const PRICE_PREMIUM: &str = "price_premium_monthly";

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// Direct handle on the store, for arranging and inspecting state.
    pub store: Arc<RocksStore>,
    /// Temporary directory for the database (kept alive for test duration).
    pub _temp_dir: TempDir,
    /// A test user ID for authenticated requests.
    pub test_user_id: UserId,
    /// The service API key for service-to-service requests.
    pub service_api_key: String,
    /// The cron secret for job triggers.
    pub cron_secret: String,
}

impl TestHarness {
    /// Create a new test harness with a fresh database.
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Create a harness, letting the caller adjust the configuration.
    pub fn with_config(adjust: impl FnOnce(&mut ServiceConfig)) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = Arc::new(RocksStore::open(temp_dir.path()).expect("Failed to open store"));

        let service_api_key = "test-service-key".to_string();
        let cron_secret = "test-cron-secret".to_string();

        let mut config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            data_dir: temp_dir.path().to_string_lossy().to_string(),
            service_api_key: Some(service_api_key.clone()),
            cron_secret: Some(cron_secret.clone()),
            stripe_webhook_secret: Some(WEBHOOK_SECRET.into()),
            stripe_prices: PriceTierMap::new(&[PRICE_ESSENTIAL.into()], &[PRICE_PREMIUM.into()]),
            rate_limit_per_minute: 1000,
            ..ServiceConfig::default()
        };
        adjust(&mut config);

        let state = AppState::new(store.clone(), config);
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            store,
            _temp_dir: temp_dir,
            test_user_id: UserId::generate(),
            service_api_key,
            cron_secret,
        }
    }

    /// Get the authorization header for user authentication.
    pub fn user_auth_header(&self) -> HeaderValue {
        user_auth_header(&self.test_user_id)
    }

    /// Get the authorization header for job triggers.
    pub fn cron_auth_header(&self) -> HeaderValue {
        header_value(&format!("Bearer {}", self.cron_secret))
    }

    /// Get the service API key header value.
    pub fn service_key_header(&self) -> HeaderValue {
        header_value(&self.service_api_key)
    }

    /// Register the test user through the API.
    pub async fn register(&self) -> Value {
        let response = self
            .server
            .post("/v1/accounts")
            .add_header(AUTHORIZATION, self.user_auth_header())
            .await;
        response.assert_status_ok();
        response.json()
    }

    /// Store a FREE user (no trial) directly.
    pub fn seed_free_user(&self) -> User {
        let mut user = User::register(self.test_user_id, Utc::now() - Duration::days(1), 7);
        user.subscription_tier = Tier::Free;
        user.trial_ends_at = None;
        self.store.put_user(&user).expect("Failed to store user");
        user
    }

    /// Load the test user from the store.
    pub fn stored_user(&self) -> User {
        self.store
            .get_user(&self.test_user_id)
            .expect("Failed to read user")
            .expect("User missing")
    }

    /// Post a signed Stripe event.
    pub async fn send_event(&self, event: &Value) -> axum_test::TestResponse {
        let payload = event.to_string();
        let signature = dream_oracle_service::stripe::sign_payload(
            WEBHOOK_SECRET,
            Utc::now().timestamp(),
            &payload,
        );

        self.server
            .post("/webhooks/stripe")
            .add_header(HeaderName::from_static("stripe-signature"), header_value(&signature))
            .text(payload)
            .await
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Authorization header for any user.
pub fn user_auth_header(user_id: &UserId) -> HeaderValue {
    header_value(&format!("Bearer test-token:{user_id}"))
}

/// Name of the service API key header.
pub fn x_api_key() -> HeaderName {
    HeaderName::from_static("x-api-key")
}

/// Build a header value from a string.
pub fn header_value(value: &str) -> HeaderValue {
    HeaderValue::from_str(value).expect("Invalid header value")
}

/// Build a Stripe event envelope.
pub fn stripe_event(id: &str, event_type: &str, created: i64, object: Value) -> Value {
    json!({
        "id": id,
        "object": "event",
        "type": event_type,
        "created": created,
        "data": { "object": object }
    })
}

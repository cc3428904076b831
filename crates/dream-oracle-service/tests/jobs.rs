//! Scheduled job trigger integration tests.

mod common;

use axum::http::header::AUTHORIZATION;
use chrono::{Duration, Utc};
use common::{header_value, TestHarness};
use serde_json::Value;

use dream_oracle_core::{MeteredAction, SubscriptionStatus, Tier, UsageLog, User, UserId};
use dream_oracle_store::Store;

// ============================================================================
// Trial Expiration
// ============================================================================

#[tokio::test]
async fn expire_trials_downgrades_only_lapsed_trials() {
    let harness = TestHarness::new();
    let now = Utc::now();

    let lapsed = User::register(harness.test_user_id, now - Duration::days(10), 7);
    harness.store.put_user(&lapsed).unwrap();

    let running = User::register(UserId::generate(), now - Duration::days(2), 7);
    harness.store.put_user(&running).unwrap();

    let mut paid = User::register(UserId::generate(), now - Duration::days(30), 7);
    paid.stripe_subscription_id = Some("sub_paid".into());
    harness.store.put_user(&paid).unwrap();

    let response = harness
        .server
        .post("/jobs/expire-trials")
        .add_header(AUTHORIZATION, harness.cron_auth_header())
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["downgraded"], 1);

    let user = harness.stored_user();
    assert_eq!(user.subscription_tier, Tier::Free);
    assert_eq!(user.subscription_status, SubscriptionStatus::Expired);
    assert!(user.credits_reset_at.is_some_and(|at| at > now - Duration::minutes(1)));

    let running = harness.store.get_user(&running.id).unwrap().unwrap();
    assert_eq!(running.subscription_tier, Tier::Premium);
    let paid = harness.store.get_user(&paid.id).unwrap().unwrap();
    assert_eq!(paid.subscription_tier, Tier::Premium);
}

#[tokio::test]
async fn expire_trials_is_idempotent() {
    let harness = TestHarness::new();
    let lapsed = User::register(harness.test_user_id, Utc::now() - Duration::days(10), 7);
    harness.store.put_user(&lapsed).unwrap();

    for expected in [1, 0] {
        let response = harness
            .server
            .post("/jobs/expire-trials")
            .add_header(AUTHORIZATION, harness.cron_auth_header())
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["downgraded"], expected);
    }
}

#[tokio::test]
async fn jobs_require_cron_secret() {
    let harness = TestHarness::new();

    let response = harness.server.post("/jobs/expire-trials").await;
    response.assert_status_unauthorized();

    let response = harness
        .server
        .post("/jobs/cleanup")
        .add_header(AUTHORIZATION, header_value("Bearer wrong-secret"))
        .await;
    response.assert_status_unauthorized();
}

#[tokio::test]
async fn jobs_disabled_without_cron_secret() {
    let harness = TestHarness::with_config(|config| config.cron_secret = None);

    let response = harness
        .server
        .post("/jobs/expire-trials")
        .add_header(AUTHORIZATION, harness.cron_auth_header())
        .await;

    response.assert_status_unauthorized();
}

// ============================================================================
// Usage Log Cleanup
// ============================================================================

#[tokio::test]
async fn cleanup_deletes_logs_past_retention() {
    let harness = TestHarness::with_config(|config| config.usage_retention_days = 30);
    let user = harness.seed_free_user();
    let now = Utc::now();

    for days_ago in [90, 45, 5] {
        let log = UsageLog::new(
            user.id,
            MeteredAction::Dream,
            now - Duration::days(days_ago),
            None,
        );
        harness.store.append_usage_log(&log).unwrap();
    }

    let response = harness
        .server
        .post("/jobs/cleanup")
        .add_header(AUTHORIZATION, harness.cron_auth_header())
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["deleted"], 2);

    let remaining = harness
        .store
        .count_usage_since(&user.id, MeteredAction::Dream, now - Duration::days(365))
        .unwrap();
    assert_eq!(remaining, 1);
}

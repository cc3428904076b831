//! Biorhythm endpoint integration tests.

mod common;

use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use common::TestHarness;
use serde_json::{json, Value};

/// Register the test user with a 1990-01-01 birth date.
async fn born_1990(harness: &TestHarness) {
    harness.register().await;
    harness
        .server
        .put("/v1/accounts/me/birth-date")
        .add_header(AUTHORIZATION, harness.user_auth_header())
        .json(&json!({ "birth_date": "1990-01-01" }))
        .await
        .assert_status_ok();
}

async fn get(harness: &TestHarness, path: &str) -> axum_test::TestResponse {
    harness
        .server
        .get(path)
        .add_header(AUTHORIZATION, harness.user_auth_header())
        .await
}

// ============================================================================
// Single Day
// ============================================================================

#[tokio::test]
async fn reading_requires_birth_date() {
    let harness = TestHarness::new();
    harness.register().await;

    let response = get(&harness, "/v1/biorhythm").await;

    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "birth_date_required");
}

#[tokio::test]
async fn physical_cycle_returns_to_zero_after_one_period() {
    let harness = TestHarness::new();
    born_1990(&harness).await;

    let response = get(&harness, "/v1/biorhythm?date=1990-01-24").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["date"], "1990-01-24");
    assert_eq!(body["physical"]["days_since_birth"], 23);
    assert!(body["physical"]["value"].as_f64().unwrap().abs() < 1e-9);
    assert_eq!(body["physical"]["phase"], "critical");
    assert!(body["physical"]["description"]
        .as_str()
        .is_some_and(|d| !d.is_empty()));
    assert_eq!(body["emotional"]["cycle"], "emotional");
    assert_eq!(body["intellectual"]["days_since_birth"], 23);
}

#[tokio::test]
async fn reading_defaults_to_today() {
    let harness = TestHarness::new();
    born_1990(&harness).await;

    let response = get(&harness, "/v1/biorhythm").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(
        body["date"],
        chrono::Utc::now().date_naive().to_string()
    );
}

#[tokio::test]
async fn reading_requires_auth() {
    let harness = TestHarness::new();

    let response = harness.server.get("/v1/biorhythm").await;

    response.assert_status_unauthorized();
}

// ============================================================================
// Ranges
// ============================================================================

#[tokio::test]
async fn range_is_inclusive() {
    let harness = TestHarness::new();
    born_1990(&harness).await;

    let response = get(&harness, "/v1/biorhythm/range?start=1990-01-01&end=1990-01-10").await;

    response.assert_status_ok();
    let body: Value = response.json();
    let days = body["days"].as_array().unwrap();
    assert_eq!(days.len(), 10);
    assert_eq!(days[0]["date"], "1990-01-01");
    assert_eq!(days[9]["date"], "1990-01-10");
    assert_eq!(days[0]["physical"], 0.0);
}

#[tokio::test]
async fn range_accepts_a_full_leap_year() {
    let harness = TestHarness::new();
    born_1990(&harness).await;

    let response = get(&harness, "/v1/biorhythm/range?start=2024-01-01&end=2024-12-31").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["days"].as_array().unwrap().len(), 366);
}

#[tokio::test]
async fn range_rejects_oversized_and_inverted_spans() {
    let harness = TestHarness::new();
    born_1990(&harness).await;

    get(&harness, "/v1/biorhythm/range?start=2024-01-01&end=2025-01-02")
        .await
        .assert_status_bad_request();

    get(&harness, "/v1/biorhythm/range?start=2024-02-01&end=2024-01-01")
        .await
        .assert_status_bad_request();
}

// ============================================================================
// Critical Days
// ============================================================================

#[tokio::test]
async fn critical_days_in_window() {
    let harness = TestHarness::new();
    born_1990(&harness).await;

    let response = get(&harness, "/v1/biorhythm/critical?from=1990-01-06&days=10").await;

    response.assert_status_ok();
    let body: Value = response.json();
    let critical = body["critical_days"].as_array().unwrap();
    assert_eq!(critical.len(), 1);
    assert_eq!(critical[0]["date"], "1990-01-15");
    assert_eq!(critical[0]["cycle"], "emotional");
}

#[tokio::test]
async fn critical_days_window_is_bounded() {
    let harness = TestHarness::new();
    born_1990(&harness).await;

    get(&harness, "/v1/biorhythm/critical?days=0")
        .await
        .assert_status_bad_request();

    get(&harness, "/v1/biorhythm/critical?days=366")
        .await
        .assert_status_bad_request();

    get(&harness, "/v1/biorhythm/critical?days=365")
        .await
        .assert_status_ok();
}

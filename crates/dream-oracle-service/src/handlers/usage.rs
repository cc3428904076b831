//! Usage metering handlers.
//!
//! Users read their own quota summary; the app's action handlers check and
//! record metered actions with the service API key.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use dream_oracle_core::{LimitCheck, MeteredAction, UserId};

use crate::auth::{AuthUser, ServiceAuth};
use crate::error::ApiError;
use crate::metering::UsageSummary;
use crate::state::AppState;

/// Get the authenticated user's usage in the current window.
pub async fn get_usage(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<UsageSummary>, ApiError> {
    Ok(Json(state.meter.summary(&auth.user_id)?))
}

/// Limit check request.
#[derive(Debug, Deserialize)]
pub struct CheckUsageRequest {
    /// The user performing the action.
    pub user_id: UserId,
    /// The metered action.
    pub action: MeteredAction,
}

/// Check whether a user may perform a metered action.
///
/// A denied check is returned with `200 OK` and `allowed: false`.
pub async fn check_usage(
    State(state): State<Arc<AppState>>,
    service: ServiceAuth,
    Json(body): Json<CheckUsageRequest>,
) -> Result<Json<LimitCheck>, ApiError> {
    let check = state.meter.check_limit(&body.user_id, body.action)?;

    tracing::debug!(
        service = %service.service_name,
        user_id = %body.user_id,
        action = %body.action,
        allowed = check.allowed,
        "Usage checked"
    );

    Ok(Json(check))
}

/// Record usage request.
#[derive(Debug, Deserialize)]
pub struct RecordUsageRequest {
    /// The user who performed the action.
    pub user_id: UserId,
    /// The metered action.
    pub action: MeteredAction,
    /// Reference to the resource acted upon.
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// Record usage response.
#[derive(Debug, Serialize)]
pub struct RecordUsageResponse {
    /// Whether the usage was recorded.
    pub recorded: bool,
    /// The new log entry ID.
    pub log_id: String,
}

/// Record a completed metered action.
pub async fn record_usage(
    State(state): State<Arc<AppState>>,
    service: ServiceAuth,
    Json(body): Json<RecordUsageRequest>,
) -> Result<Json<RecordUsageResponse>, ApiError> {
    let metadata = body.metadata.map(|value| match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    });

    let log = state.meter.record_usage(&body.user_id, body.action, metadata)?;

    tracing::info!(
        service = %service.service_name,
        user_id = %body.user_id,
        action = %body.action,
        "Usage reported"
    );

    Ok(Json(RecordUsageResponse {
        recorded: true,
        log_id: log.id.to_string(),
    }))
}

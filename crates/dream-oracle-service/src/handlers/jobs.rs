//! Scheduled-job trigger handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::Utc;

use crate::auth::CronAuth;
use crate::error::ApiError;
use crate::jobs::{self, CleanupReport, ExpireTrialsReport};
use crate::state::AppState;

/// Downgrade lapsed trials.
pub async fn expire_trials(
    State(state): State<Arc<AppState>>,
    _cron: CronAuth,
) -> Result<Json<ExpireTrialsReport>, ApiError> {
    let report = jobs::expire_trials(state.store.as_ref(), Utc::now())?;
    Ok(Json(report))
}

/// Delete usage logs past the retention window.
pub async fn cleanup(
    State(state): State<Arc<AppState>>,
    _cron: CronAuth,
) -> Result<Json<CleanupReport>, ApiError> {
    let report = jobs::cleanup_usage_logs(
        state.store.as_ref(),
        Utc::now(),
        state.config.usage_retention_days,
    )?;

    state.rate_limiter.shrink();

    Ok(Json(report))
}

//! Account registration and billing state handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use dream_oracle_core::{SubscriptionStatus, Tier, TrialState, User};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Account response.
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    /// User ID.
    pub user_id: String,
    /// Tier as stored.
    pub subscription_tier: Tier,
    /// Tier that governs access right now.
    pub effective_tier: Tier,
    /// Subscription status.
    pub subscription_status: SubscriptionStatus,
    /// Trial state.
    pub trial: TrialState,
    /// Whether a paid subscription is attached.
    pub has_paid_subscription: bool,
    /// End of the paid period.
    pub subscription_ends: Option<DateTime<Utc>>,
    /// Start of the current metering window.
    pub credits_reset_at: Option<DateTime<Utc>>,
    /// Birth date, if set.
    pub birth_date: Option<NaiveDate>,
    /// Created timestamp.
    pub created_at: String,
}

impl AccountResponse {
    fn at(user: &User, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user.id.to_string(),
            subscription_tier: user.subscription_tier,
            effective_tier: user.effective_tier(now),
            subscription_status: user.subscription_status,
            trial: user.trial_state(now),
            has_paid_subscription: user.has_paid_subscription(),
            subscription_ends: user.subscription_ends,
            credits_reset_at: user.credits_reset_at,
            birth_date: user.birth_date,
            created_at: user.created_at.to_rfc3339(),
        }
    }
}

/// Register the authenticated user on a Premium trial.
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<AccountResponse>, ApiError> {
    let now = Utc::now();
    let user = User::register(auth.user_id, now, state.config.trial_days);
    if !state.store.create_user(&user)? {
        return Err(ApiError::Conflict("Account already exists".into()));
    }

    tracing::info!(
        user_id = %user.id,
        trial_ends_at = ?user.trial_ends_at,
        "Account registered"
    );

    Ok(Json(AccountResponse::at(&user, now)))
}

/// Get the authenticated user's billing state.
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<AccountResponse>, ApiError> {
    let user = load_user(&state, &auth)?;
    Ok(Json(AccountResponse::at(&user, Utc::now())))
}

/// Set birth date request.
#[derive(Debug, Deserialize)]
pub struct SetBirthDateRequest {
    /// Birth date (`YYYY-MM-DD`).
    pub birth_date: NaiveDate,
}

/// Set the authenticated user's birth date.
pub async fn set_birth_date(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<SetBirthDateRequest>,
) -> Result<Json<AccountResponse>, ApiError> {
    let now = Utc::now();
    if body.birth_date > now.date_naive() {
        return Err(ApiError::BadRequest("Birth date is in the future".into()));
    }

    let update = state.store.modify_user(&auth.user_id, &mut |user: &mut User| {
        user.birth_date = Some(body.birth_date);
        user.updated_at = now;
        true
    })?;
    let user = update.user();

    tracing::debug!(user_id = %user.id, "Birth date updated");

    Ok(Json(AccountResponse::at(user, now)))
}

/// Load the authenticated user's record.
pub(crate) fn load_user(state: &AppState, auth: &AuthUser) -> Result<User, ApiError> {
    state
        .store
        .get_user(&auth.user_id)?
        .ok_or_else(|| ApiError::NotFound("Account not found".into()))
}

//! Biorhythm handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use dream_oracle_core::{
    calculate_biorhythm, calculate_biorhythm_range, days_between, find_critical_days, Biorhythm,
    CriticalDay, DailyBiorhythm, DomainError,
};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::handlers::accounts::load_user;
use crate::state::AppState;

/// Longest range served by the range endpoint, in days.
const MAX_RANGE_DAYS: i64 = 366;

/// Longest look-ahead served by the critical-days endpoint, in days.
const MAX_CRITICAL_DAYS: u32 = 365;

/// Default look-ahead for the critical-days endpoint.
const DEFAULT_CRITICAL_DAYS: u32 = 30;

fn birth_date(state: &AppState, auth: &AuthUser) -> Result<NaiveDate, ApiError> {
    load_user(state, auth)?
        .birth_date
        .ok_or(ApiError::BirthDateRequired)
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Single-day query.
#[derive(Debug, Deserialize)]
pub struct DayQuery {
    /// Target date (default: today, UTC).
    pub date: Option<NaiveDate>,
}

/// Single-day response.
#[derive(Debug, Serialize)]
pub struct DayResponse {
    /// The target date.
    pub date: NaiveDate,
    /// The three cycle readings.
    #[serde(flatten)]
    pub biorhythm: Biorhythm,
}

/// Get the three cycle readings for one day.
pub async fn get_biorhythm(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<DayQuery>,
) -> Result<Json<DayResponse>, ApiError> {
    let birth = birth_date(&state, &auth)?;
    let date = query.date.unwrap_or_else(today);

    Ok(Json(DayResponse {
        date,
        biorhythm: calculate_biorhythm(birth, date),
    }))
}

/// Range query.
#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    /// First date (inclusive).
    pub start: NaiveDate,
    /// Last date (inclusive).
    pub end: NaiveDate,
}

/// Range response.
#[derive(Debug, Serialize)]
pub struct RangeResponse {
    /// One entry per day, ascending.
    pub days: Vec<DailyBiorhythm>,
}

/// Get daily values for an inclusive date range.
pub async fn get_range(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<RangeQuery>,
) -> Result<Json<RangeResponse>, ApiError> {
    let span = days_between(query.start, query.end) + 1;
    if span < 1 {
        return Err(DomainError::InvalidDateRange("end is before start".into()).into());
    }
    if span > MAX_RANGE_DAYS {
        return Err(DomainError::InvalidDateRange(format!(
            "range spans {span} days, at most {MAX_RANGE_DAYS} allowed"
        ))
        .into());
    }

    let birth = birth_date(&state, &auth)?;

    Ok(Json(RangeResponse {
        days: calculate_biorhythm_range(birth, query.start, query.end).collect(),
    }))
}

/// Critical-days query.
#[derive(Debug, Deserialize)]
pub struct CriticalQuery {
    /// First date scanned (default: today, UTC).
    pub from: Option<NaiveDate>,
    /// Number of days scanned.
    pub days: Option<u32>,
}

/// Critical-days response.
#[derive(Debug, Serialize)]
pub struct CriticalResponse {
    /// One entry per cycle crossing near zero.
    pub critical_days: Vec<CriticalDay>,
}

/// Find upcoming critical days.
pub async fn get_critical_days(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<CriticalQuery>,
) -> Result<Json<CriticalResponse>, ApiError> {
    let days = query.days.unwrap_or(DEFAULT_CRITICAL_DAYS);
    if !(1..=MAX_CRITICAL_DAYS).contains(&days) {
        return Err(DomainError::InvalidDateRange(format!(
            "days must be between 1 and {MAX_CRITICAL_DAYS}"
        ))
        .into());
    }

    let birth = birth_date(&state, &auth)?;
    let from = query.from.unwrap_or_else(today);

    Ok(Json(CriticalResponse {
        critical_days: find_critical_days(birth, from, days),
    }))
}

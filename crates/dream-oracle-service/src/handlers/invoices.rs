//! Invoice listing handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use dream_oracle_core::Invoice;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Maximum invoices returned per request.
const MAX_LIMIT: usize = 100;

/// Invoice list query.
#[derive(Debug, Deserialize)]
pub struct ListInvoicesQuery {
    /// Maximum number of invoices (default 50, at most 100).
    pub limit: Option<usize>,
}

/// Invoice list response.
#[derive(Debug, Serialize)]
pub struct ListInvoicesResponse {
    /// Invoices, newest first.
    pub invoices: Vec<Invoice>,
}

/// List the authenticated user's invoices.
pub async fn list_invoices(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<ListInvoicesQuery>,
) -> Result<Json<ListInvoicesResponse>, ApiError> {
    let limit = query.limit.unwrap_or(50).clamp(1, MAX_LIMIT);
    let invoices = state.store.list_invoices_by_user(&auth.user_id, limit)?;

    Ok(Json(ListInvoicesResponse { invoices }))
}

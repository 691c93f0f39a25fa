//! Handlers for the `/credits` resource.

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use pixelforge_db::repositories::CreditRepo;
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// Query parameters for `GET /credits`.
#[derive(Debug, Deserialize)]
pub struct CreditQuery {
    /// Maximum number of ledger entries to include. Defaults to 20.
    pub limit: Option<i64>,
}

/// GET /api/v1/credits
///
/// Current balance plus the most recent ledger entries.
pub async fn get_credits(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<CreditQuery>,
) -> AppResult<impl IntoResponse> {
    let balance = CreditRepo::balance(&state.pool, auth.user_id).await?;
    let entries =
        CreditRepo::recent_entries(&state.pool, auth.user_id, params.limit.unwrap_or(20)).await?;

    Ok(Json(DataResponse {
        data: serde_json::json!({
            "balance": balance,
            "ledger": entries,
        }),
    }))
}

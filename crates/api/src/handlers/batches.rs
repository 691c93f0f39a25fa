//! Handlers for the `/batches` resource.
//!
//! All endpoints require authentication via [`AuthUser`] and are scoped
//! to the authenticated user's own batches.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use pixelforge_core::error::CoreError;
use pixelforge_core::types::DbId;
use pixelforge_db::models::BatchWithVariations;
use pixelforge_db::repositories::{BatchRepo, VariationRepo};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::credits::CreditService;
use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// Query parameters for `GET /batches`.
#[derive(Debug, Deserialize)]
pub struct BatchQuery {
    /// Maximum number of results. Defaults to 50, capped at 100.
    pub limit: Option<i64>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<i64>,
}

/// GET /api/v1/batches
///
/// List the authenticated user's batches, newest first.
pub async fn list_batches(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<BatchQuery>,
) -> AppResult<impl IntoResponse> {
    let batches =
        BatchRepo::list_for_user(&state.pool, auth.user_id, params.limit, params.offset).await?;
    Ok(Json(DataResponse { data: batches }))
}

/// GET /api/v1/batches/{id}
///
/// Fetch one batch with all of its variations in sequence order.
pub async fn get_batch(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(batch_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let batch = BatchRepo::find_for_user(&state.pool, batch_id, auth.user_id)
        .await?
        .ok_or_else(|| CoreError::NotFound {
            entity: "batch",
            id: batch_id,
        })?;
    let variations = VariationRepo::list_for_batch(&state.pool, batch_id).await?;

    Ok(Json(DataResponse {
        data: BatchWithVariations { batch, variations },
    }))
}

/// POST /api/v1/batches/{id}/cancel
///
/// Stop tracking a batch's unfinished variations. The provider is not
/// told to abort; its late reports for cancelled variations are simply
/// ignored. Cancelled variations count as non-completions, so the
/// settlement that follows refunds them.
pub async fn cancel_batch(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(batch_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let batch = BatchRepo::find_for_user(&state.pool, batch_id, auth.user_id)
        .await?
        .ok_or_else(|| CoreError::NotFound {
            entity: "batch",
            id: batch_id,
        })?;

    let cancelled = VariationRepo::cancel_non_terminal(&state.pool, batch.id).await?;
    let status = BatchRepo::recompute_status(&state.pool, batch.id).await?;
    let refunded = CreditService::settle_batch(&state.pool, batch.id, status).await?;

    tracing::info!(
        batch_id,
        user_id = auth.user_id,
        cancelled = cancelled.len(),
        refunded,
        "Batch cancelled"
    );

    Ok(Json(DataResponse {
        data: serde_json::json!({
            "batch_id": batch.id,
            "cancelled_variations": cancelled,
            "status": status.code(),
            "credits_refunded": refunded,
        }),
    }))
}

//! Provider webhook ingestion endpoint.
//!
//! The callback URL is minted per variation at submission time and
//! carries the owning user id, the variation id, and a correlation id
//! query parameter. There is no bearer auth on this route; possession of
//! the full URL (correlation id included) is the credential, and any
//! mismatch is answered with the same 404 as a nonexistent variation.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use pixelforge_core::types::DbId;
use pixelforge_provider::WebhookPayload;
use serde::Deserialize;
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::ingest::IngestOutcome;
use crate::state::AppState;

/// Query parameters for the webhook callback.
#[derive(Debug, Deserialize)]
pub struct WebhookQuery {
    /// Per-variation correlation id minted at submission.
    pub cid: String,
}

/// POST /api/v1/webhooks/generation/{user_id}/{variation_id}?cid=...
///
/// Ingest one provider status report. Always answers 200 for duplicates
/// and stale reports so the provider stops retrying; answers 404 for
/// unknown or mismatched targets and 5xx only for genuine processing
/// failures (which the provider should retry).
pub async fn generation_webhook(
    State(state): State<AppState>,
    Path((user_id, variation_id)): Path<(DbId, DbId)>,
    Query(query): Query<WebhookQuery>,
    Json(payload): Json<WebhookPayload>,
) -> AppResult<impl IntoResponse> {
    if payload.external_job_id.trim().is_empty() {
        return Err(AppError::BadRequest("missing external job id".into()));
    }

    let report = payload.to_report();
    tracing::debug!(
        user_id,
        variation_id,
        external_job_id = %payload.external_job_id,
        status = report.label(),
        "Webhook received"
    );

    let outcome = state
        .ingest
        .ingest_webhook(
            user_id,
            variation_id,
            &query.cid,
            &payload.external_job_id,
            report,
        )
        .await?;

    let body = match &outcome {
        IngestOutcome::Applied(status) => json!({
            "data": { "result": "applied", "status": status.code() }
        }),
        IngestOutcome::Duplicate => json!({ "data": { "result": "duplicate" } }),
        IngestOutcome::Ignored => json!({ "data": { "result": "ignored" } }),
    };
    Ok((StatusCode::OK, Json(body)))
}

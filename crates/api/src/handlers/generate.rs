//! Handler for the `/generate` endpoint.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use pixelforge_core::types::DbId;
use serde::Deserialize;
use validator::Validate;

use crate::auth::AuthUser;
use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;
use crate::submission::SubmissionRequest;

/// Body for `POST /generate`.
#[derive(Debug, Deserialize, Validate)]
pub struct GenerateBody {
    /// Append to this batch instead of creating a new one. When set, the
    /// operation kind and provider parameters of the batch are reused and
    /// the ones in this body are ignored.
    pub batch_id: Option<DbId>,
    /// How many variations to generate.
    #[validate(range(min = 1, max = 10))]
    pub count: i32,
    /// Operation kind (e.g. `txt2img`, `img2img`). Required for new
    /// batches.
    #[validate(length(min = 1, max = 64))]
    pub operation_kind: Option<String>,
    /// Opaque provider parameters forwarded with each job.
    pub provider_params: Option<serde_json::Value>,
}

/// POST /api/v1/generate
///
/// Charge credits, create or extend a batch, and fan the variations out
/// to the provider. Returns 201 with a submission summary; 402 when the
/// user cannot afford the charge; 502 when every variation failed to
/// reach the provider (credits already refunded).
pub async fn generate(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(body): Json<GenerateBody>,
) -> AppResult<impl IntoResponse> {
    body.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    if body.batch_id.is_none() && body.operation_kind.as_deref().unwrap_or("").is_empty() {
        return Err(AppError::BadRequest(
            "operation_kind is required for a new batch".into(),
        ));
    }

    let request = SubmissionRequest {
        batch_id: body.batch_id,
        count: body.count,
        operation_kind: body.operation_kind.unwrap_or_default(),
        provider_params: body.provider_params.unwrap_or(serde_json::Value::Null),
    };

    let summary = state.submission.submit(auth.user_id, request).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: summary })))
}

//! Health and readiness probes.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::state::AppState;

/// GET /health
///
/// Liveness plus a database round-trip and the current live session
/// count. Answers 503 when the database is unreachable.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let db_ok = pixelforge_db::health_check(&state.pool).await.is_ok();
    let sessions = state.registry.session_count().await;

    let status = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({
            "status": if db_ok { "ok" } else { "degraded" },
            "database": db_ok,
            "live_sessions": sessions,
        })),
    )
}

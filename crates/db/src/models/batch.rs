//! Batch entity model and DTOs.

use pixelforge_core::status::BatchStatus;
use pixelforge_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::variation::Variation;

/// A row from the `batches` table: one user-initiated generation request.
///
/// Never deleted, only status-transitioned. The `status` column holds a
/// [`BatchStatus`] code; see [`Batch::status`].
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Batch {
    pub id: DbId,
    pub user_id: DbId,
    pub requested_count: i32,
    pub status: String,
    pub credits_charged: i64,
    /// Cumulative credits refunded across settlements. A batch can settle
    /// more than once if it is extended after settling.
    pub credits_refunded: i64,
    pub refund_issued: bool,
    pub operation_kind: String,
    pub provider_params: serde_json::Value,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Batch {
    /// Typed view of the `status` column. Unknown codes (which would
    /// indicate a migration gap) read as `Processing`.
    pub fn status(&self) -> BatchStatus {
        BatchStatus::from_code(&self.status).unwrap_or(BatchStatus::Processing)
    }
}

/// A batch together with its variations, as returned to clients.
#[derive(Debug, Serialize)]
pub struct BatchWithVariations {
    #[serde(flatten)]
    pub batch: Batch,
    pub variations: Vec<Variation>,
}

/// DTO for creating a batch row.
#[derive(Debug, Deserialize)]
pub struct CreateBatch {
    pub operation_kind: String,
    pub provider_params: serde_json::Value,
    pub requested_count: i32,
    pub credits_charged: i64,
}

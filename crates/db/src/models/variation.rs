//! Variation entity model.

use pixelforge_core::status::VariationStatus;
use pixelforge_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `variations` table: one unit of generated output.
///
/// `seq_no` is unique and strictly increasing within a batch, assigned
/// without gaps by `VariationRepo::allocate`. `external_job_id` stays
/// `NULL` until provider submission succeeds; `outputs` is populated only
/// on success and `error_message` only on failure.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Variation {
    pub id: DbId,
    pub batch_id: DbId,
    pub seq_no: i32,
    pub status: String,
    pub external_job_id: Option<String>,
    pub correlation_id: String,
    pub outputs: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub error_kind: Option<String>,
    /// Set when post-processing failed and the provider's raw output was
    /// kept as a degraded fallback.
    pub degraded: bool,
    /// Consecutive provider status-check failures (reset on success).
    pub check_failures: i32,
    /// Reaper retry attempts for variations stuck without a usable handle.
    pub retry_attempts: i32,
    pub submitted_at: Timestamp,
    pub completed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Variation {
    /// Typed view of the `status` column. Unknown codes read as
    /// `Submitted` so they remain visible to the reaper.
    pub fn status(&self) -> VariationStatus {
        VariationStatus::from_code(&self.status).unwrap_or(VariationStatus::Submitted)
    }

    /// Whether this variation has reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }
}

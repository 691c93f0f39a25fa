//! Repository for the `variations` table.
//!
//! Holds the transactional sequence allocation and the guarded status
//! transitions. Terminal writes use a `status NOT IN (...)` guard so that
//! when the webhook path and the poller race, at most one writer wins.

use pixelforge_core::lifecycle::ErrorKind;
use pixelforge_core::status::VariationStatus;
use pixelforge_core::types::{DbId, Timestamp};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::variation::Variation;

/// Column list for `variations` queries.
const COLUMNS: &str = "\
    id, batch_id, seq_no, status, external_job_id, correlation_id, \
    outputs, error_message, error_kind, degraded, \
    check_failures, retry_attempts, \
    submitted_at, completed_at, created_at, updated_at";

/// Provides CRUD operations and lifecycle transitions for variations.
pub struct VariationRepo;

impl VariationRepo {
    /// Allocate `count` new variations for a batch with contiguous
    /// sequence numbers `max(existing) + 1 ..= max(existing) + count`.
    ///
    /// The read-highest / write-new pair runs inside one transaction that
    /// first locks the batch row (`SELECT ... FOR UPDATE`), so a racing
    /// allocation for the same batch blocks until this one commits and
    /// then observes its inserts. A failure at any point rolls the whole
    /// allocation back; partial allocation is never visible.
    pub async fn allocate(
        pool: &PgPool,
        batch_id: DbId,
        count: i32,
    ) -> Result<Vec<Variation>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        // Serialize allocations per batch.
        sqlx::query("SELECT id FROM batches WHERE id = $1 FOR UPDATE")
            .bind(batch_id)
            .fetch_one(&mut *tx)
            .await?;

        let highest: i32 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(seq_no), 0) FROM variations WHERE batch_id = $1",
        )
        .bind(batch_id)
        .fetch_one(&mut *tx)
        .await?;

        let mut created = Vec::with_capacity(count as usize);
        for offset in 1..=count {
            let query = format!(
                "INSERT INTO variations (batch_id, seq_no, status, correlation_id) \
                 VALUES ($1, $2, $3, $4) \
                 RETURNING {COLUMNS}"
            );
            let variation = sqlx::query_as::<_, Variation>(&query)
                .bind(batch_id)
                .bind(highest + offset)
                .bind(VariationStatus::Submitted.code())
                .bind(Uuid::new_v4().to_string())
                .fetch_one(&mut *tx)
                .await?;
            created.push(variation);
        }

        tx.commit().await?;
        Ok(created)
    }

    /// Find a variation by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Variation>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM variations WHERE id = $1");
        sqlx::query_as::<_, Variation>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Look up a variation by (variation id, external job handle), scoped
    /// to the owning user's batches.
    ///
    /// Used by webhook ingestion; a miss here is a hard 404-equivalent.
    pub async fn find_for_ingest(
        pool: &PgPool,
        variation_id: DbId,
        external_job_id: &str,
        user_id: DbId,
    ) -> Result<Option<Variation>, sqlx::Error> {
        sqlx::query_as::<_, Variation>(
            "SELECT v.* FROM variations v \
             JOIN batches b ON b.id = v.batch_id \
             WHERE v.id = $1 AND v.external_job_id = $2 AND b.user_id = $3",
        )
            .bind(variation_id)
            .bind(external_job_id)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// List all variations of a batch ordered by sequence number.
    pub async fn list_for_batch(
        pool: &PgPool,
        batch_id: DbId,
    ) -> Result<Vec<Variation>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM variations WHERE batch_id = $1 ORDER BY seq_no ASC"
        );
        sqlx::query_as::<_, Variation>(&query)
            .bind(batch_id)
            .fetch_all(pool)
            .await
    }

    /// Record a successful provider submission: store the external job
    /// handle and move `SUBMITTED -> IN_QUEUE`.
    ///
    /// Guarded so a webhook that already completed the variation (the
    /// webhook can outrun this write) is not clobbered.
    pub async fn mark_in_queue(
        pool: &PgPool,
        variation_id: DbId,
        external_job_id: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE variations \
             SET external_job_id = $2, status = $3, updated_at = NOW() \
             WHERE id = $1 AND status = $4",
        )
        .bind(variation_id)
        .bind(external_job_id)
        .bind(VariationStatus::InQueue.code())
        .bind(VariationStatus::Submitted.code())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record the external handle without touching the status.
    ///
    /// Used when `mark_in_queue` loses the race against a webhook: the
    /// handle must still be stored so the poller can find the job.
    pub async fn set_external_job_id(
        pool: &PgPool,
        variation_id: DbId,
        external_job_id: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE variations \
             SET external_job_id = COALESCE(external_job_id, $2), updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(variation_id)
        .bind(external_job_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Non-terminal progress update (`IN_QUEUE`, `PROCESSING`).
    ///
    /// Guarded against terminal states; a late intermediate report must
    /// never resurrect a finished variation.
    pub async fn update_progress(
        pool: &PgPool,
        variation_id: DbId,
        status: VariationStatus,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE variations \
             SET status = $2, updated_at = NOW() \
             WHERE id = $1 AND status NOT IN ($3, $4, $5)",
        )
        .bind(variation_id)
        .bind(status.code())
        .bind(VariationStatus::TERMINAL_CODES[0])
        .bind(VariationStatus::TERMINAL_CODES[1])
        .bind(VariationStatus::TERMINAL_CODES[2])
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Terminal success: write `COMPLETED` with output references.
    ///
    /// Returns `true` only for the writer that actually applied the
    /// transition; a concurrent duplicate sees `false`.
    pub async fn mark_completed(
        pool: &PgPool,
        variation_id: DbId,
        outputs: &serde_json::Value,
        degraded: bool,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE variations \
             SET status = $2, outputs = $3, degraded = $4, \
                 completed_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status NOT IN ($5, $6, $7)",
        )
        .bind(variation_id)
        .bind(VariationStatus::Completed.code())
        .bind(outputs)
        .bind(degraded)
        .bind(VariationStatus::TERMINAL_CODES[0])
        .bind(VariationStatus::TERMINAL_CODES[1])
        .bind(VariationStatus::TERMINAL_CODES[2])
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Terminal failure: write `FAILED` with a reason and classification.
    pub async fn mark_failed(
        pool: &PgPool,
        variation_id: DbId,
        reason: &str,
        kind: ErrorKind,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE variations \
             SET status = $2, error_message = $3, error_kind = $4, \
                 completed_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status NOT IN ($5, $6, $7)",
        )
        .bind(variation_id)
        .bind(VariationStatus::Failed.code())
        .bind(reason)
        .bind(kind.code())
        .bind(VariationStatus::TERMINAL_CODES[0])
        .bind(VariationStatus::TERMINAL_CODES[1])
        .bind(VariationStatus::TERMINAL_CODES[2])
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark all non-terminal variations of a batch `CANCELLED` (local
    /// tracking stop only). Returns the IDs that were cancelled.
    pub async fn cancel_non_terminal(
        pool: &PgPool,
        batch_id: DbId,
    ) -> Result<Vec<DbId>, sqlx::Error> {
        sqlx::query_scalar(
            "UPDATE variations \
             SET status = $2, completed_at = NOW(), updated_at = NOW() \
             WHERE batch_id = $1 AND status NOT IN ($3, $4, $5) \
             RETURNING id",
        )
        .bind(batch_id)
        .bind(VariationStatus::Cancelled.code())
        .bind(VariationStatus::TERMINAL_CODES[0])
        .bind(VariationStatus::TERMINAL_CODES[1])
        .bind(VariationStatus::TERMINAL_CODES[2])
        .fetch_all(pool)
        .await
    }

    // ---- poller scan queries ----

    /// Non-terminal variations that have a known external handle, for the
    /// reconciliation poller to status-check.
    pub async fn list_pollable(
        pool: &PgPool,
        limit: i64,
    ) -> Result<Vec<Variation>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM variations \
             WHERE status NOT IN ($1, $2, $3) AND external_job_id IS NOT NULL \
             ORDER BY submitted_at ASC \
             LIMIT $4"
        );
        sqlx::query_as::<_, Variation>(&query)
            .bind(VariationStatus::TERMINAL_CODES[0])
            .bind(VariationStatus::TERMINAL_CODES[1])
            .bind(VariationStatus::TERMINAL_CODES[2])
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Non-terminal variations older than `cutoff`, for the stuck reaper.
    ///
    /// Covers both handle-less variations (submission never recorded a
    /// handle) and handle-bearing ones whose checks keep failing.
    pub async fn list_stuck(
        pool: &PgPool,
        cutoff: Timestamp,
        limit: i64,
    ) -> Result<Vec<Variation>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM variations \
             WHERE status NOT IN ($1, $2, $3) AND submitted_at < $4 \
               AND (external_job_id IS NULL OR check_failures > 0) \
             ORDER BY submitted_at ASC \
             LIMIT $5"
        );
        sqlx::query_as::<_, Variation>(&query)
            .bind(VariationStatus::TERMINAL_CODES[0])
            .bind(VariationStatus::TERMINAL_CODES[1])
            .bind(VariationStatus::TERMINAL_CODES[2])
            .bind(cutoff)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Increment the consecutive status-check failure counter and return
    /// the new value.
    pub async fn record_check_failure(
        pool: &PgPool,
        variation_id: DbId,
    ) -> Result<i32, sqlx::Error> {
        sqlx::query_scalar(
            "UPDATE variations \
             SET check_failures = check_failures + 1, updated_at = NOW() \
             WHERE id = $1 \
             RETURNING check_failures",
        )
        .bind(variation_id)
        .fetch_one(pool)
        .await
    }

    /// Reset the consecutive status-check failure counter after a
    /// successful check.
    pub async fn reset_check_failures(
        pool: &PgPool,
        variation_id: DbId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE variations SET check_failures = 0, updated_at = NOW() \
             WHERE id = $1 AND check_failures > 0",
        )
        .bind(variation_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Increment the reaper retry counter and return the new value.
    pub async fn record_retry_attempt(
        pool: &PgPool,
        variation_id: DbId,
    ) -> Result<i32, sqlx::Error> {
        sqlx::query_scalar(
            "UPDATE variations \
             SET retry_attempts = retry_attempts + 1, updated_at = NOW() \
             WHERE id = $1 \
             RETURNING retry_attempts",
        )
        .bind(variation_id)
        .fetch_one(pool)
        .await
    }
}

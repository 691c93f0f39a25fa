//! Repository for the `batches` table.

use pixelforge_core::aggregate;
use pixelforge_core::status::{BatchStatus, VariationStatus};
use pixelforge_core::types::DbId;
use sqlx::PgPool;

use crate::models::batch::{Batch, CreateBatch};

/// Column list for `batches` queries.
const COLUMNS: &str = "\
    id, user_id, requested_count, status, credits_charged, credits_refunded, \
    refund_issued, operation_kind, provider_params, created_at, updated_at";

/// Maximum page size for batch listing.
const MAX_LIMIT: i64 = 100;

/// Default page size for batch listing.
const DEFAULT_LIMIT: i64 = 50;

/// Provides CRUD operations and aggregate recomputation for batches.
pub struct BatchRepo;

impl BatchRepo {
    /// Create a new batch in `PROCESSING` status.
    pub async fn create(
        pool: &PgPool,
        user_id: DbId,
        input: &CreateBatch,
    ) -> Result<Batch, sqlx::Error> {
        let query = format!(
            "INSERT INTO batches \
                 (user_id, requested_count, status, credits_charged, \
                  operation_kind, provider_params) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Batch>(&query)
            .bind(user_id)
            .bind(input.requested_count)
            .bind(BatchStatus::Processing.code())
            .bind(input.credits_charged)
            .bind(&input.operation_kind)
            .bind(&input.provider_params)
            .fetch_one(pool)
            .await
    }

    /// Find a batch by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Batch>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM batches WHERE id = $1");
        sqlx::query_as::<_, Batch>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a batch by ID, scoped to its owner.
    pub async fn find_for_user(
        pool: &PgPool,
        id: DbId,
        user_id: DbId,
    ) -> Result<Option<Batch>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM batches WHERE id = $1 AND user_id = $2");
        sqlx::query_as::<_, Batch>(&query)
            .bind(id)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// List a user's batches, newest first.
    pub async fn list_for_user(
        pool: &PgPool,
        user_id: DbId,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<Batch>, sqlx::Error> {
        let limit = limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
        let offset = offset.unwrap_or(0).max(0);

        let query = format!(
            "SELECT {COLUMNS} FROM batches WHERE user_id = $1 \
             ORDER BY created_at DESC LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, Batch>(&query)
            .bind(user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Bump `requested_count` and `credits_charged` when more variations
    /// are appended to an existing batch. Re-opens the settlement claim:
    /// the extended batch will settle again, and `credits_refunded`
    /// keeps that second settlement from re-paying the first shortfall.
    pub async fn extend(
        pool: &PgPool,
        batch_id: DbId,
        added_count: i32,
        added_credits: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE batches \
             SET requested_count = requested_count + $2, \
                 credits_charged = credits_charged + $3, \
                 status = $4, \
                 refund_issued = FALSE, \
                 updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(batch_id)
        .bind(added_count)
        .bind(added_credits)
        .bind(BatchStatus::Processing.code())
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Reverse an [`extend`](Self::extend) whose submission aborted before
    /// any variation was allocated, so a later settlement does not count
    /// credits the user already got back.
    pub async fn retract_extension(
        pool: &PgPool,
        batch_id: DbId,
        added_count: i32,
        added_credits: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE batches \
             SET requested_count = requested_count - $2, \
                 credits_charged = credits_charged - $3, \
                 updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(batch_id)
        .bind(added_count)
        .bind(added_credits)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Recompute the batch's aggregate status from the authoritative set
    /// of its variation statuses, returning the new value.
    ///
    /// The batch row is locked for the duration of the transaction, so
    /// two variations finishing concurrently serialize here and the last
    /// writer still computes from the full, current set — never from
    /// incremented counters.
    pub async fn recompute_status(
        pool: &PgPool,
        batch_id: DbId,
    ) -> Result<BatchStatus, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query("SELECT id FROM batches WHERE id = $1 FOR UPDATE")
            .bind(batch_id)
            .fetch_one(&mut *tx)
            .await?;

        let codes: Vec<String> =
            sqlx::query_scalar("SELECT status FROM variations WHERE batch_id = $1")
                .bind(batch_id)
                .fetch_all(&mut *tx)
                .await?;

        let statuses: Vec<VariationStatus> = codes
            .iter()
            .filter_map(|c| VariationStatus::from_code(c))
            .collect();
        let derived = aggregate::batch_status(&statuses);

        sqlx::query("UPDATE batches SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(batch_id)
            .bind(derived.code())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(derived)
    }

    /// Claim the right to issue this batch's refund.
    ///
    /// Returns the batch row only for the single caller that flips
    /// `refund_issued` from `FALSE` to `TRUE`; every other caller gets
    /// `None`. This is the never-double-issued guard.
    pub async fn claim_refund(
        pool: &PgPool,
        batch_id: DbId,
    ) -> Result<Option<Batch>, sqlx::Error> {
        let query = format!(
            "UPDATE batches SET refund_issued = TRUE, updated_at = NOW() \
             WHERE id = $1 AND refund_issued = FALSE \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Batch>(&query)
            .bind(batch_id)
            .fetch_optional(pool)
            .await
    }

    /// Release a refund claim after the ledger write failed, so a later
    /// settlement attempt can retry it.
    pub async fn release_refund_claim(
        pool: &PgPool,
        batch_id: DbId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE batches SET refund_issued = FALSE, updated_at = NOW() WHERE id = $1",
        )
        .bind(batch_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Record an issued refund against the batch's running total.
    pub async fn record_refund(
        pool: &PgPool,
        batch_id: DbId,
        amount: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE batches \
             SET credits_refunded = credits_refunded + $2, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(batch_id)
        .bind(amount)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Number of this batch's variations that produced output.
    pub async fn count_completed(pool: &PgPool, batch_id: DbId) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM variations WHERE batch_id = $1 AND status = $2",
        )
        .bind(batch_id)
        .bind(VariationStatus::Completed.code())
        .fetch_one(pool)
        .await
    }
}

//! Repository for the credit ledger.
//!
//! Charges and refunds each run as one transaction: a balance update on
//! the `users` row plus a `credit_ledger` insert. The refund-once
//! guarantee lives in `BatchRepo::claim_refund`; this repository only
//! moves credits.

use pixelforge_core::types::DbId;
use sqlx::PgPool;

use crate::models::credit::LedgerEntry;

/// Column list for `credit_ledger` queries.
const COLUMNS: &str = "id, user_id, batch_id, delta, reason, created_at";

/// Provides charge/refund operations against the credit ledger.
pub struct CreditRepo;

impl CreditRepo {
    /// Deduct `amount` credits from a user for a batch.
    ///
    /// Fails with `Ok(false)` (no ledger write, no balance change) when
    /// the balance is insufficient.
    pub async fn charge(
        pool: &PgPool,
        user_id: DbId,
        batch_id: Option<DbId>,
        amount: i64,
        reason: &str,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE users SET credit_balance = credit_balance - $2 \
             WHERE id = $1 AND credit_balance >= $2",
        )
        .bind(user_id)
        .bind(amount)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO credit_ledger (user_id, batch_id, delta, reason) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(user_id)
        .bind(batch_id)
        .bind(-amount)
        .bind(reason)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Return `amount` credits to a user for a batch.
    pub async fn refund(
        pool: &PgPool,
        user_id: DbId,
        batch_id: Option<DbId>,
        amount: i64,
        reason: &str,
    ) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query("UPDATE users SET credit_balance = credit_balance + $2 WHERE id = $1")
            .bind(user_id)
            .bind(amount)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO credit_ledger (user_id, batch_id, delta, reason) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(user_id)
        .bind(batch_id)
        .bind(amount)
        .bind(reason)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Current credit balance for a user.
    pub async fn balance(pool: &PgPool, user_id: DbId) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT credit_balance FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_one(pool)
            .await
    }

    /// Most recent ledger entries for a user, newest first.
    pub async fn recent_entries(
        pool: &PgPool,
        user_id: DbId,
        limit: i64,
    ) -> Result<Vec<LedgerEntry>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM credit_ledger WHERE user_id = $1 \
             ORDER BY created_at DESC LIMIT $2"
        );
        sqlx::query_as::<_, LedgerEntry>(&query)
            .bind(user_id)
            .bind(limit)
            .fetch_all(pool)
            .await
    }
}

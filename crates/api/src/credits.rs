//! Batch settlement: refund the shortfall exactly once.

use pixelforge_core::credits::outstanding_refund;
use pixelforge_core::status::BatchStatus;
use pixelforge_core::types::DbId;
use pixelforge_db::repositories::{BatchRepo, CreditRepo};
use pixelforge_db::DbPool;

use crate::error::AppResult;

/// Settlement entry point, called whenever a batch's aggregate status is
/// recomputed. Stateless; concurrency safety comes from the repository's
/// `refund_issued` claim.
pub struct CreditService;

impl CreditService {
    /// Settle a batch if it has reached a terminal aggregate status.
    ///
    /// Every path that can finish the last variation of a batch calls
    /// this (webhook ingestion, the poller, the reaper, submission
    /// failures, cancellation). Only the caller that wins the refund
    /// claim issues the ledger write; everyone else is a no-op. Returns
    /// the credits refunded by this call.
    pub async fn settle_batch(
        pool: &DbPool,
        batch_id: DbId,
        batch_status: BatchStatus,
    ) -> AppResult<i64> {
        if !batch_status.is_terminal() {
            return Ok(0);
        }

        let Some(batch) = BatchRepo::claim_refund(pool, batch_id).await? else {
            // Another settler already issued (or is issuing) the refund.
            return Ok(0);
        };

        let completed = BatchRepo::count_completed(pool, batch_id).await?;
        let refund =
            outstanding_refund(batch.credits_charged, completed, batch.credits_refunded);
        if refund == 0 {
            // Claim stays consumed: nothing is owed under the current
            // charge/completion totals.
            return Ok(0);
        }

        let reason = format!("refund for batch {batch_id}: {completed} completed");
        if let Err(err) =
            CreditRepo::refund(pool, batch.user_id, Some(batch_id), refund, &reason).await
        {
            // Put the claim back so a later settlement attempt retries the
            // ledger write instead of silently swallowing the refund.
            BatchRepo::release_refund_claim(pool, batch_id).await?;
            return Err(err.into());
        }
        BatchRepo::record_refund(pool, batch_id, refund).await?;

        tracing::info!(
            batch_id,
            user_id = batch.user_id,
            refund,
            completed,
            charged = batch.credits_charged,
            "Issued batch settlement refund"
        );
        Ok(refund)
    }
}

//! Provider report ingestion.
//!
//! Webhook callbacks and reconciliation poll results converge here: both
//! are normalized to a [`ProviderReport`] and pushed through the same
//! pipeline of dedup, decision, guarded write, post-processing, batch
//! aggregation, settlement, and client notification. The pipeline is
//! idempotent end to end; replays and races resolve to a single applied
//! transition and a single set of side effects.

pub mod dedup;

use std::sync::Arc;
use std::time::Duration;

use pixelforge_core::error::CoreError;
use pixelforge_core::lifecycle::{apply_report, ErrorKind, IngestAction, ProviderReport};
use pixelforge_core::status::VariationStatus;
use pixelforge_core::types::DbId;
use pixelforge_db::models::Variation;
use pixelforge_db::repositories::{BatchRepo, VariationRepo};
use pixelforge_db::DbPool;
use pixelforge_events::{ClientEvent, ClientEventType, EventBus};
use serde_json::json;

use crate::credits::CreditService;
use crate::error::{AppError, AppResult};
use crate::postprocess::PostProcessor;
use dedup::{DedupCache, DedupKey};

/// How many times webhook ingestion re-reads a variation that is not yet
/// visible, and the pause between reads. Covers the window where the
/// provider's callback outruns the submission transaction that records
/// the external job handle.
const LOOKUP_ATTEMPTS: u32 = 3;
const LOOKUP_RETRY_DELAY: Duration = Duration::from_millis(150);

/// What a single report application amounted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// A status transition was written (and its side effects performed).
    Applied(VariationStatus),
    /// Recognized replay; acknowledged without touching anything.
    Duplicate,
    /// Valid but stale or already-superseded report; no write.
    Ignored,
}

pub struct IngestService {
    pool: DbPool,
    dedup: Arc<DedupCache>,
    bus: Arc<EventBus>,
    postprocessor: Arc<dyn PostProcessor>,
}

impl IngestService {
    pub fn new(
        pool: DbPool,
        dedup: Arc<DedupCache>,
        bus: Arc<EventBus>,
        postprocessor: Arc<dyn PostProcessor>,
    ) -> Self {
        Self {
            pool,
            dedup,
            bus,
            postprocessor,
        }
    }

    pub fn dedup(&self) -> &DedupCache {
        &self.dedup
    }

    /// Ingest a webhook-delivered report.
    ///
    /// The variation is looked up by the full (variation id, external job
    /// handle, user id) triple plus the per-variation correlation id from
    /// the callback URL; any mismatch is a hard not-found so a spoofed or
    /// misrouted callback cannot touch another user's work.
    pub async fn ingest_webhook(
        &self,
        user_id: DbId,
        variation_id: DbId,
        correlation_id: &str,
        external_job_id: &str,
        report: ProviderReport,
    ) -> AppResult<IngestOutcome> {
        let key = DedupKey::new(external_job_id, report.label(), variation_id);
        if !self.dedup.insert_if_absent(&key) {
            tracing::debug!(
                variation_id,
                external_job_id,
                status = report.label(),
                "Duplicate webhook delivery absorbed"
            );
            return Ok(IngestOutcome::Duplicate);
        }

        let result = self
            .ingest_webhook_inner(user_id, variation_id, correlation_id, external_job_id, &report)
            .await;

        if result.is_err() {
            // Forget this delivery so the provider's retry re-drives the
            // whole pipeline instead of being absorbed as a duplicate.
            self.dedup.remove(&key);
        }
        result
    }

    async fn ingest_webhook_inner(
        &self,
        user_id: DbId,
        variation_id: DbId,
        correlation_id: &str,
        external_job_id: &str,
        report: &ProviderReport,
    ) -> AppResult<IngestOutcome> {
        let variation = self
            .lookup_with_retry(user_id, variation_id, external_job_id)
            .await?;

        let Some(variation) = variation else {
            return Err(CoreError::NotFound {
                entity: "variation",
                id: variation_id,
            }
            .into());
        };

        if variation.correlation_id != correlation_id {
            tracing::warn!(variation_id, "Webhook correlation id mismatch");
            return Err(CoreError::NotFound {
                entity: "variation",
                id: variation_id,
            }
            .into());
        }

        // Terminal-on-terminal across restarts: the dedup cache is
        // process-local, the status column is not. A crash between the
        // terminal write and settlement leaves the batch aggregate stale,
        // so the duplicate re-runs the idempotent aggregate/settle step
        // before being absorbed.
        if variation.is_terminal() && report.is_terminal() {
            self.settle(&variation).await?;
            return Ok(IngestOutcome::Duplicate);
        }

        self.apply(&variation, report).await
    }

    /// Apply a normalized report to a known variation row. Shared by
    /// webhook ingestion and the reconciliation poller.
    pub async fn apply(
        &self,
        variation: &Variation,
        report: &ProviderReport,
    ) -> AppResult<IngestOutcome> {
        match apply_report(variation.status(), report) {
            IngestAction::Ignore => Ok(IngestOutcome::Ignored),

            IngestAction::Progress(status) => {
                let written =
                    VariationRepo::update_progress(&self.pool, variation.id, status).await?;
                if !written {
                    // A terminal writer got there first.
                    return Ok(IngestOutcome::Ignored);
                }
                self.publish_progress(variation, status).await?;
                Ok(IngestOutcome::Applied(status))
            }

            IngestAction::Complete { outputs } => self.complete(variation, &outputs).await,

            IngestAction::Fail { reason, kind } => self.fail(variation, &reason, kind).await,
        }
    }

    /// Post-process outputs, write `COMPLETED`, then aggregate and notify.
    async fn complete(
        &self,
        variation: &Variation,
        outputs: &serde_json::Value,
    ) -> AppResult<IngestOutcome> {
        let (stored, degraded) = match self.postprocessor.process(variation.id, outputs).await {
            Ok(processed) => (processed, false),
            Err(err) => {
                // Generation itself succeeded; keep the raw outputs and
                // flag the result instead of failing the variation.
                tracing::warn!(
                    variation_id = variation.id,
                    error = %err,
                    "Post-processing failed, storing degraded result"
                );
                (outputs.clone(), true)
            }
        };

        let won = VariationRepo::mark_completed(&self.pool, variation.id, &stored, degraded)
            .await?;
        if !won {
            return Ok(IngestOutcome::Ignored);
        }

        let batch_status = self.settle(variation).await?;
        self.bus.publish(ClientEvent::new(
            self.owner_of(variation).await?,
            ClientEventType::VariationCompleted,
            json!({
                "batch_id": variation.batch_id,
                "variation_id": variation.id,
                "seq_no": variation.seq_no,
                "outputs": stored,
                "degraded": degraded,
                "batch_status": batch_status.code(),
            }),
        ));
        Ok(IngestOutcome::Applied(VariationStatus::Completed))
    }

    /// Write `FAILED`, then aggregate, settle, and notify.
    pub async fn fail(
        &self,
        variation: &Variation,
        reason: &str,
        kind: ErrorKind,
    ) -> AppResult<IngestOutcome> {
        let won = VariationRepo::mark_failed(&self.pool, variation.id, reason, kind).await?;
        if !won {
            return Ok(IngestOutcome::Ignored);
        }

        let batch_status = self.settle(variation).await?;
        self.bus.publish(ClientEvent::new(
            self.owner_of(variation).await?,
            ClientEventType::VariationFailed,
            json!({
                "batch_id": variation.batch_id,
                "variation_id": variation.id,
                "seq_no": variation.seq_no,
                "reason": reason,
                "error_kind": kind.code(),
                "batch_status": batch_status.code(),
            }),
        ));
        Ok(IngestOutcome::Applied(VariationStatus::Failed))
    }

    /// Recompute the batch aggregate and run settlement if it just became
    /// terminal. Called after every applied terminal transition.
    async fn settle(&self, variation: &Variation) -> AppResult<pixelforge_core::status::BatchStatus> {
        let batch_status = BatchRepo::recompute_status(&self.pool, variation.batch_id).await?;
        CreditService::settle_batch(&self.pool, variation.batch_id, batch_status).await?;
        Ok(batch_status)
    }

    async fn publish_progress(
        &self,
        variation: &Variation,
        status: VariationStatus,
    ) -> AppResult<()> {
        let event_type = match status {
            VariationStatus::Processing => ClientEventType::VariationStarted,
            _ => ClientEventType::Progress,
        };
        self.bus.publish(ClientEvent::new(
            self.owner_of(variation).await?,
            event_type,
            json!({
                "batch_id": variation.batch_id,
                "variation_id": variation.id,
                "seq_no": variation.seq_no,
                "status": status.code(),
            }),
        ));
        Ok(())
    }

    async fn owner_of(&self, variation: &Variation) -> AppResult<DbId> {
        let batch = BatchRepo::find_by_id(&self.pool, variation.batch_id)
            .await?
            .ok_or_else(|| AppError::Internal(format!(
                "batch {} missing for variation {}",
                variation.batch_id, variation.id
            )))?;
        Ok(batch.user_id)
    }

    async fn lookup_with_retry(
        &self,
        user_id: DbId,
        variation_id: DbId,
        external_job_id: &str,
    ) -> AppResult<Option<Variation>> {
        for attempt in 1..=LOOKUP_ATTEMPTS {
            let found =
                VariationRepo::find_for_ingest(&self.pool, variation_id, external_job_id, user_id)
                    .await?;
            if found.is_some() {
                return Ok(found);
            }
            if attempt < LOOKUP_ATTEMPTS {
                tracing::debug!(
                    variation_id,
                    external_job_id,
                    attempt,
                    "Variation not yet visible for webhook, retrying lookup"
                );
                tokio::time::sleep(LOOKUP_RETRY_DELAY).await;
            }
        }
        Ok(None)
    }
}

//! Batch and variation submission.
//!
//! One request charges credits up front, creates (or extends) a batch,
//! allocates gap-free sequence numbers, then fans the variations out to
//! the provider concurrently. Submission failures are terminal per
//! variation and flow through the same fail path as ingestion, so the
//! aggregate, settlement, and notification behavior is identical no
//! matter where a variation dies.

use std::sync::Arc;

use futures::future::join_all;
use pixelforge_core::credits::charge_amount;
use pixelforge_core::error::CoreError;
use pixelforge_core::lifecycle::ErrorKind;
use pixelforge_core::status::BatchStatus;
use pixelforge_core::types::DbId;
use pixelforge_db::models::{Batch, CreateBatch, Variation};
use pixelforge_db::repositories::{BatchRepo, CreditRepo, UserRepo, VariationRepo};
use pixelforge_db::DbPool;
use pixelforge_events::{ClientEvent, ClientEventType, EventBus};
use pixelforge_provider::{ProviderClient, SubmitJobRequest};
use serde::Serialize;
use serde_json::json;

use crate::config::ServerConfig;
use crate::error::{AppError, AppResult};
use crate::ingest::IngestService;

/// Most variations a single submission may request.
pub const MAX_VARIATIONS_PER_REQUEST: i32 = 10;

/// A validated submission: either a new batch or more variations for an
/// existing one.
#[derive(Debug)]
pub struct SubmissionRequest {
    /// Extend this batch instead of creating one. Operation kind and
    /// provider parameters are inherited from the batch when set.
    pub batch_id: Option<DbId>,
    pub count: i32,
    pub operation_kind: String,
    pub provider_params: serde_json::Value,
}

/// What the submission fan-out amounted to, returned to the client.
#[derive(Debug, Serialize)]
pub struct SubmissionSummary {
    pub batch_id: DbId,
    pub variation_ids: Vec<DbId>,
    pub requested: i32,
    pub submitted: usize,
    pub failed: usize,
    pub batch_status: String,
}

pub struct SubmissionService {
    pool: DbPool,
    provider: Arc<ProviderClient>,
    bus: Arc<EventBus>,
    ingest: Arc<IngestService>,
    config: Arc<ServerConfig>,
}

impl SubmissionService {
    pub fn new(
        pool: DbPool,
        provider: Arc<ProviderClient>,
        bus: Arc<EventBus>,
        ingest: Arc<IngestService>,
        config: Arc<ServerConfig>,
    ) -> Self {
        Self {
            pool,
            provider,
            bus,
            ingest,
            config,
        }
    }

    /// Charge, allocate, and fan out one submission.
    ///
    /// Returns an error without charging when validation or batch
    /// ownership fails; a failure between the charge and the fan-out
    /// reverses the charge before the error surfaces; returns
    /// [`AppError::SubmissionFailed`] after refund settlement when not a
    /// single variation reached the provider.
    pub async fn submit(
        &self,
        user_id: DbId,
        request: SubmissionRequest,
    ) -> AppResult<SubmissionSummary> {
        if request.count < 1 || request.count > MAX_VARIATIONS_PER_REQUEST {
            return Err(CoreError::Validation(format!(
                "count must be between 1 and {MAX_VARIATIONS_PER_REQUEST}"
            ))
            .into());
        }

        // Ownership is checked before any credits move, so a charge can
        // never land against a batch the caller does not own.
        let existing = match request.batch_id {
            Some(batch_id) => Some(
                BatchRepo::find_for_user(&self.pool, batch_id, user_id)
                    .await?
                    .ok_or(CoreError::NotFound {
                        entity: "batch",
                        id: batch_id,
                    })?,
            ),
            None => None,
        };

        let charge = charge_amount(i64::from(request.count));
        let charged = CreditRepo::charge(
            &self.pool,
            user_id,
            request.batch_id,
            charge,
            "generation charge",
        )
        .await?;
        if !charged {
            // A zero-row charge is either an unknown user or a real
            // shortfall; tell them apart for the response code.
            let user = UserRepo::find_by_id(&self.pool, user_id)
                .await?
                .ok_or(CoreError::NotFound {
                    entity: "user",
                    id: user_id,
                })?;
            return Err(CoreError::InsufficientCredits {
                needed: charge,
                available: user.credit_balance,
            }
            .into());
        }

        // Past this point the user has paid. Any failure before the
        // fan-out must reverse the charge before the error surfaces.
        let (batch, variations) = match self
            .prepare_and_allocate(user_id, existing, &request, charge)
            .await
        {
            Ok(prepared) => prepared,
            Err(err) => {
                if let Err(refund_err) = CreditRepo::refund(
                    &self.pool,
                    user_id,
                    request.batch_id,
                    charge,
                    "submission aborted",
                )
                .await
                {
                    tracing::error!(
                        user_id,
                        error = %refund_err,
                        "Failed to reverse charge for aborted submission"
                    );
                }
                return Err(err);
            }
        };
        let variation_ids: Vec<DbId> = variations.iter().map(|v| v.id).collect();

        let results = join_all(
            variations
                .iter()
                .map(|v| self.submit_one(user_id, &batch, v)),
        )
        .await;

        let mut submitted = 0usize;
        let mut failed = 0usize;
        for result in results {
            match result {
                Ok(()) => submitted += 1,
                Err(err) => {
                    failed += 1;
                    tracing::warn!(batch_id = batch.id, error = %err, "Variation submission failed");
                }
            }
        }

        if submitted == 0 {
            // Every variation is already FAILED; the per-variation fail
            // path recomputed the aggregate and issued the refund.
            return Err(AppError::SubmissionFailed(format!(
                "all {failed} variations failed to submit"
            )));
        }

        // Announced only once at least one variation actually reached the
        // provider; an all-failed fan-out emits nothing but failures.
        self.bus.publish(ClientEvent::new(
            user_id,
            ClientEventType::GenerationStarted,
            json!({
                "batch_id": batch.id,
                "variation_ids": variation_ids,
                "requested": request.count,
                "submitted": submitted,
            }),
        ));

        let batch_status = BatchRepo::find_by_id(&self.pool, batch.id)
            .await?
            .map(|b| b.status())
            .unwrap_or(BatchStatus::Processing);

        tracing::info!(
            batch_id = batch.id,
            user_id,
            submitted,
            failed,
            "Submission fan-out finished"
        );

        Ok(SubmissionSummary {
            batch_id: batch.id,
            variation_ids,
            requested: request.count,
            submitted,
            failed,
            batch_status: batch_status.code().to_string(),
        })
    }

    /// Create or extend the batch, then allocate sequence numbers.
    ///
    /// Runs entirely after the charge; the caller reverses the charge when
    /// any step here fails.
    async fn prepare_and_allocate(
        &self,
        user_id: DbId,
        existing: Option<Batch>,
        request: &SubmissionRequest,
        charge: i64,
    ) -> AppResult<(Batch, Vec<Variation>)> {
        let batch = match existing {
            Some(batch) => {
                BatchRepo::extend(&self.pool, batch.id, request.count, charge).await?;
                match VariationRepo::allocate(&self.pool, batch.id, request.count).await {
                    Ok(variations) => return Ok((batch, variations)),
                    Err(err) => {
                        // The extension is already on the batch row; take
                        // it back off so settlement accounting stays exact
                        // once the caller reverses the charge.
                        BatchRepo::retract_extension(
                            &self.pool,
                            batch.id,
                            request.count,
                            charge,
                        )
                        .await?;
                        return Err(err.into());
                    }
                }
            }
            None => {
                let input = CreateBatch {
                    operation_kind: request.operation_kind.clone(),
                    provider_params: request.provider_params.clone(),
                    requested_count: request.count,
                    credits_charged: charge,
                };
                BatchRepo::create(&self.pool, user_id, &input).await?
            }
        };

        let variations = VariationRepo::allocate(&self.pool, batch.id, request.count).await?;
        Ok((batch, variations))
    }

    /// Submit one variation to the provider.
    ///
    /// On success the external handle is recorded and the variation moves
    /// to `IN_QUEUE` (unless a webhook already beat us past it). On
    /// failure the variation is failed terminally with a classification
    /// that distinguishes operator error from transport error.
    async fn submit_one(
        &self,
        user_id: DbId,
        batch: &Batch,
        variation: &Variation,
    ) -> AppResult<()> {
        let request = SubmitJobRequest {
            model: self.config.provider.model.clone(),
            operation: batch.operation_kind.clone(),
            params: batch.provider_params.clone(),
            webhook_url: self.webhook_url(user_id, variation),
        };

        let submit = self.provider.submit_job(&request);
        let outcome = tokio::time::timeout(self.config.lifecycle.submit_timeout, submit).await;

        let (reason, kind) = match outcome {
            Ok(Ok(response)) => {
                let moved =
                    VariationRepo::mark_in_queue(&self.pool, variation.id, &response.job_id)
                        .await?;
                if !moved {
                    // The webhook outran us; still record the handle so
                    // the poller can find the job.
                    VariationRepo::set_external_job_id(
                        &self.pool,
                        variation.id,
                        &response.job_id,
                    )
                    .await?;
                }
                return Ok(());
            }
            Ok(Err(err)) if err.is_configuration() => {
                (err.to_string(), ErrorKind::Configuration)
            }
            Ok(Err(err)) => (err.to_string(), ErrorKind::Transport),
            Err(_) => (
                format!(
                    "provider submission timed out after {}s",
                    self.config.lifecycle.submit_timeout.as_secs()
                ),
                ErrorKind::Transport,
            ),
        };

        self.ingest.fail(variation, &reason, kind).await?;
        Err(AppError::SubmissionFailed(reason))
    }

    fn webhook_url(&self, user_id: DbId, variation: &Variation) -> String {
        format!(
            "{}/api/v1/webhooks/generation/{}/{}?cid={}",
            self.config.provider.callback_base_url.trim_end_matches('/'),
            user_id,
            variation.id,
            variation.correlation_id,
        )
    }
}

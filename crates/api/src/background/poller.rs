//! Reconciliation poller.
//!
//! Webhooks are the primary status channel but they can be lost. The
//! poller periodically scans non-terminal variations that hold an
//! external job handle, asks the provider for their current status, and
//! pushes the answer through the same ingestion pipeline a webhook would
//! take. A variation whose status checks keep erroring is force-failed
//! as unreachable once the consecutive-failure budget is spent.

use std::sync::Arc;

use pixelforge_core::lifecycle::{check_budget_exhausted, ErrorKind};
use pixelforge_db::models::Variation;
use pixelforge_db::repositories::VariationRepo;
use pixelforge_db::DbPool;
use pixelforge_provider::ProviderClient;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::LifecycleConfig;
use crate::error::AppResult;
use crate::ingest::IngestService;

/// Most variations examined per tick.
const POLL_BATCH_LIMIT: i64 = 100;

pub struct ReconciliationPoller {
    pool: DbPool,
    provider: Arc<ProviderClient>,
    ingest: Arc<IngestService>,
    config: LifecycleConfig,
    // Single-flight: a tick that outlives the interval is skipped, not
    // stacked behind the previous one.
    in_flight: Mutex<()>,
}

impl ReconciliationPoller {
    pub fn new(
        pool: DbPool,
        provider: Arc<ProviderClient>,
        ingest: Arc<IngestService>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            pool,
            provider,
            ingest,
            config,
            in_flight: Mutex::new(()),
        }
    }

    /// Spawn the poll loop. Returns once cancellation is observed.
    pub fn start(self: Arc<Self>, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.poll_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            tracing::info!(
                interval_secs = self.config.poll_interval.as_secs(),
                "Reconciliation poller started"
            );

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let Ok(_guard) = self.in_flight.try_lock() else {
                            tracing::debug!("Previous poll tick still running, skipping");
                            continue;
                        };
                        if let Err(err) = self.tick().await {
                            tracing::error!(error = %err, "Poll tick failed");
                        }
                    }
                    _ = shutdown.cancelled() => {
                        tracing::info!("Reconciliation poller shutting down");
                        break;
                    }
                }
            }
        })
    }

    /// One reconciliation pass.
    pub async fn tick(&self) -> AppResult<()> {
        let purged = self.ingest.dedup().purge_expired();
        if purged > 0 {
            tracing::debug!(purged, "Purged expired dedup entries");
        }

        let pollable = VariationRepo::list_pollable(&self.pool, POLL_BATCH_LIMIT).await?;
        if pollable.is_empty() {
            return Ok(());
        }
        tracing::debug!(count = pollable.len(), "Polling provider for in-flight variations");

        for variation in &pollable {
            if let Err(err) = self.check_one(variation).await {
                tracing::warn!(
                    variation_id = variation.id,
                    error = %err,
                    "Reconciliation check failed"
                );
            }
        }
        Ok(())
    }

    async fn check_one(&self, variation: &Variation) -> AppResult<()> {
        // list_pollable filters on this column; the unwrap never fires
        // but the row type keeps it optional.
        let Some(job_id) = variation.external_job_id.as_deref() else {
            return Ok(());
        };

        match self.provider.job_status(job_id).await {
            Ok(status) => {
                VariationRepo::reset_check_failures(&self.pool, variation.id).await?;
                let report = status.to_report();
                let outcome = self.ingest.apply(variation, &report).await?;
                tracing::debug!(
                    variation_id = variation.id,
                    status = report.label(),
                    ?outcome,
                    "Reconciled variation from status poll"
                );
                Ok(())
            }
            Err(err) => {
                let failures =
                    VariationRepo::record_check_failure(&self.pool, variation.id).await?;
                tracing::warn!(
                    variation_id = variation.id,
                    job_id,
                    failures,
                    error = %err,
                    "Provider status check failed"
                );
                if check_budget_exhausted(failures, self.config.max_check_failures) {
                    self.ingest
                        .fail(
                            variation,
                            &format!("provider unreachable after {failures} status checks"),
                            ErrorKind::Unreachable,
                        )
                        .await?;
                }
                Ok(())
            }
        }
    }
}

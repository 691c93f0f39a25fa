//! Stuck-variation reaper.
//!
//! Catches what the poller cannot: variations that never received an
//! external job handle (the submission write was lost mid-flight) and
//! variations the provider keeps answering non-terminally for. Anything
//! still non-terminal past the age threshold burns one retry attempt per
//! pass and is force-failed as timed out when the budget runs out.

use std::sync::Arc;

use chrono::Utc;
use pixelforge_core::lifecycle::ErrorKind;
use pixelforge_db::models::Variation;
use pixelforge_db::repositories::VariationRepo;
use pixelforge_db::DbPool;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::LifecycleConfig;
use crate::error::AppResult;
use crate::ingest::IngestService;

/// Most variations examined per pass.
const REAP_BATCH_LIMIT: i64 = 100;

pub struct StuckReaper {
    pool: DbPool,
    ingest: Arc<IngestService>,
    config: LifecycleConfig,
    in_flight: Mutex<()>,
}

impl StuckReaper {
    pub fn new(pool: DbPool, ingest: Arc<IngestService>, config: LifecycleConfig) -> Self {
        Self {
            pool,
            ingest,
            config,
            in_flight: Mutex::new(()),
        }
    }

    /// Spawn the reap loop. Returns once cancellation is observed.
    pub fn start(self: Arc<Self>, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.reap_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            tracing::info!(
                interval_secs = self.config.reap_interval.as_secs(),
                stuck_after_secs = self.config.stuck_after.as_secs(),
                "Stuck reaper started"
            );

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let Ok(_guard) = self.in_flight.try_lock() else {
                            continue;
                        };
                        if let Err(err) = self.tick().await {
                            tracing::error!(error = %err, "Reap tick failed");
                        }
                    }
                    _ = shutdown.cancelled() => {
                        tracing::info!("Stuck reaper shutting down");
                        break;
                    }
                }
            }
        })
    }

    /// One reap pass.
    pub async fn tick(&self) -> AppResult<()> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.config.stuck_after)
                .unwrap_or_else(|_| chrono::Duration::seconds(300));
        let stuck = VariationRepo::list_stuck(&self.pool, cutoff, REAP_BATCH_LIMIT).await?;
        if stuck.is_empty() {
            return Ok(());
        }
        tracing::info!(count = stuck.len(), "Found stuck variations");

        for variation in &stuck {
            if let Err(err) = self.reap_one(variation).await {
                tracing::warn!(
                    variation_id = variation.id,
                    error = %err,
                    "Reaping variation failed"
                );
            }
        }
        Ok(())
    }

    async fn reap_one(&self, variation: &Variation) -> AppResult<()> {
        let attempts = VariationRepo::record_retry_attempt(&self.pool, variation.id).await?;
        if attempts < self.config.max_retry_attempts {
            // Handle-bearing variations stay with the poller; handle-less
            // ones get a few more passes in case the submission write is
            // merely slow.
            tracing::debug!(
                variation_id = variation.id,
                attempts,
                has_handle = variation.external_job_id.is_some(),
                "Stuck variation, retry budget remaining"
            );
            return Ok(());
        }

        let age_secs = (Utc::now() - variation.submitted_at).num_seconds();
        self.ingest
            .fail(
                variation,
                &format!("stuck non-terminal for {age_secs}s after {attempts} retry attempts"),
                ErrorKind::TimedOut,
            )
            .await?;
        tracing::warn!(
            variation_id = variation.id,
            age_secs,
            attempts,
            "Force-failed stuck variation"
        );
        Ok(())
    }
}

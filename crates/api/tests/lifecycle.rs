//! Service-level tests for settlement and lifecycle recovery paths that
//! sit below the HTTP surface.

mod common;

use assert_matches::assert_matches;
use common::{balance_of, build_state, seed_user};
use pixelforge_api::error::AppError;
use pixelforge_api::ingest::IngestOutcome;
use pixelforge_api::submission::SubmissionRequest;
use pixelforge_core::lifecycle::ProviderReport;
use pixelforge_core::status::BatchStatus;
use pixelforge_db::models::CreateBatch;
use pixelforge_db::repositories::{BatchRepo, VariationRepo};
use pixelforge_events::ClientEventType;
use serde_json::json;
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// Test: an all-failed fan-out refunds the charge and never announces a start
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn failed_fan_out_refunds_and_announces_nothing(pool: PgPool) {
    let user = seed_user(&pool, "quiet", 3).await;
    let state = build_state(pool.clone());
    let mut rx = state.bus.subscribe();

    // The test provider URL is a closed port; every variation fails.
    let result = state
        .submission
        .submit(
            user,
            SubmissionRequest {
                batch_id: None,
                count: 2,
                operation_kind: "txt2img".to_string(),
                provider_params: json!({}),
            },
        )
        .await;

    assert_matches!(result, Err(AppError::SubmissionFailed(_)));
    assert_eq!(balance_of(&pool, user).await, 3);

    let mut started = 0;
    let mut failed = 0;
    while let Ok(event) = rx.try_recv() {
        match event.event_type {
            ClientEventType::GenerationStarted => started += 1,
            ClientEventType::VariationFailed => failed += 1,
            _ => {}
        }
    }
    // Nothing started, so nothing is announced as started.
    assert_eq!(started, 0);
    assert_eq!(failed, 2);
}

// ---------------------------------------------------------------------------
// Test: a terminal replay repairs an aggregate that missed settlement
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn terminal_replay_repairs_missed_settlement(pool: PgPool) {
    let user = seed_user(&pool, "replayed", 0).await;
    let state = build_state(pool.clone());

    let batch = BatchRepo::create(
        &pool,
        user,
        &CreateBatch {
            operation_kind: "txt2img".to_string(),
            provider_params: json!({}),
            requested_count: 1,
            credits_charged: 1,
        },
    )
    .await
    .expect("create batch");
    let variations = VariationRepo::allocate(&pool, batch.id, 1)
        .await
        .expect("allocate");
    let variation = &variations[0];

    // Simulate a crash between the terminal write and settlement: the
    // variation is FAILED but the batch row is still PROCESSING and no
    // refund was issued.
    sqlx::query(
        "UPDATE variations \
         SET status = 'FAILED', external_job_id = 'job-replay', \
             error_message = 'boom', completed_at = NOW() \
         WHERE id = $1",
    )
    .bind(variation.id)
    .execute(&pool)
    .await
    .expect("force terminal state");

    let outcome = state
        .ingest
        .ingest_webhook(
            user,
            variation.id,
            &variation.correlation_id,
            "job-replay",
            ProviderReport::Failed {
                reason: "boom".to_string(),
            },
        )
        .await
        .expect("ingest replay");

    // The replay is absorbed, but the stale aggregate and the missing
    // refund are both repaired on the way out.
    assert_matches!(outcome, IngestOutcome::Duplicate);

    let repaired = BatchRepo::find_by_id(&pool, batch.id)
        .await
        .expect("load batch")
        .expect("batch exists");
    assert_eq!(repaired.status(), BatchStatus::Failed);
    assert_eq!(balance_of(&pool, user).await, 1);
}

// ---------------------------------------------------------------------------
// Test: the stuck scan skips handle-bearing variations whose checks succeed
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn stuck_scan_skips_variations_with_healthy_handles(pool: PgPool) {
    let user = seed_user(&pool, "slow", 0).await;

    let batch = BatchRepo::create(
        &pool,
        user,
        &CreateBatch {
            operation_kind: "txt2img".to_string(),
            provider_params: json!({}),
            requested_count: 3,
            credits_charged: 3,
        },
    )
    .await
    .expect("create batch");
    let variations = VariationRepo::allocate(&pool, batch.id, 3)
        .await
        .expect("allocate");

    // v0: handle present, checks succeeding (provider legitimately slow).
    // v1: no handle recorded.
    // v2: handle present, status checks failing.
    sqlx::query("UPDATE variations SET external_job_id = 'h0' WHERE id = $1")
        .bind(variations[0].id)
        .execute(&pool)
        .await
        .expect("set healthy handle");
    sqlx::query("UPDATE variations SET external_job_id = 'h2', check_failures = 2 WHERE id = $1")
        .bind(variations[2].id)
        .execute(&pool)
        .await
        .expect("set failing handle");

    let cutoff = chrono::Utc::now() + chrono::Duration::hours(1);
    let stuck = VariationRepo::list_stuck(&pool, cutoff, 10)
        .await
        .expect("list stuck");

    let mut stuck_ids: Vec<_> = stuck.iter().map(|v| v.id).collect();
    stuck_ids.sort_unstable();
    let mut expected = vec![variations[1].id, variations[2].id];
    expected.sort_unstable();
    assert_eq!(stuck_ids, expected);
}

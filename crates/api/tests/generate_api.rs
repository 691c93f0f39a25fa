//! Integration tests for the `/api/v1/generate` endpoint, focused on the
//! charge/refund behavior of rejected and failed submissions.

mod common;

use axum::http::StatusCode;
use common::{auth_token, balance_of, body_json, build_test_app, post_json_auth, seed_user};
use pixelforge_db::models::CreateBatch;
use pixelforge_db::repositories::BatchRepo;
use serde_json::json;
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// Test: submitting into another user's batch is a 404 and charges nothing
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn foreign_batch_submission_is_refused_without_charging(pool: PgPool) {
    let owner = seed_user(&pool, "owner", 10).await;
    let intruder = seed_user(&pool, "intruder", 5).await;

    let batch = BatchRepo::create(
        &pool,
        owner,
        &CreateBatch {
            operation_kind: "txt2img".to_string(),
            provider_params: json!({"steps": 20}),
            requested_count: 2,
            credits_charged: 2,
        },
    )
    .await
    .expect("create owner batch");

    let app = build_test_app(pool.clone());
    let response = post_json_auth(
        app,
        "/api/v1/generate",
        &auth_token(intruder),
        json!({"batch_id": batch.id, "count": 2}),
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["code"], "NOT_FOUND");

    // Ownership is checked before any credits move: full balance, no
    // ledger rows for the caller.
    assert_eq!(balance_of(&pool, intruder).await, 5);
    let ledger_rows: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM credit_ledger WHERE user_id = $1")
            .bind(intruder)
            .fetch_one(&pool)
            .await
            .expect("count ledger rows");
    assert_eq!(ledger_rows, 0);
}

// ---------------------------------------------------------------------------
// Test: insufficient balance is a 402 and charges nothing
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn insufficient_credits_return_402_without_charging(pool: PgPool) {
    let user = seed_user(&pool, "broke", 1).await;

    let app = build_test_app(pool.clone());
    let response = post_json_auth(
        app,
        "/api/v1/generate",
        &auth_token(user),
        json!({"count": 5, "operation_kind": "txt2img"}),
    )
    .await;

    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let body = body_json(response).await;
    assert_eq!(body["code"], "INSUFFICIENT_CREDITS");
    assert_eq!(balance_of(&pool, user).await, 1);
}

// ---------------------------------------------------------------------------
// Test: an unreachable provider fails the submission and refunds the charge
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn failed_fan_out_returns_502_with_charge_refunded(pool: PgPool) {
    let user = seed_user(&pool, "refunded", 3).await;

    // The test provider URL points at a closed port, so every variation
    // fails to submit.
    let app = build_test_app(pool.clone());
    let response = post_json_auth(
        app,
        "/api/v1/generate",
        &auth_token(user),
        json!({"count": 2, "operation_kind": "txt2img"}),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = body_json(response).await;
    assert_eq!(body["code"], "SUBMISSION_FAILED");

    // Zero submissions succeeded, so settlement returned the full charge
    // before the response went out.
    assert_eq!(balance_of(&pool, user).await, 3);
}

// ---------------------------------------------------------------------------
// Test: count outside 1..=10 is rejected before anything happens
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn out_of_range_count_is_rejected(pool: PgPool) {
    let user = seed_user(&pool, "greedy", 100).await;

    let app = build_test_app(pool.clone());
    let response = post_json_auth(
        app,
        "/api/v1/generate",
        &auth_token(user),
        json!({"count": 11, "operation_kind": "txt2img"}),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(balance_of(&pool, user).await, 100);
}

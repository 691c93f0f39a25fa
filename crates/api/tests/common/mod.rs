use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use sqlx::PgPool;
use tower::ServiceExt;

use pixelforge_api::auth::jwt::{generate_token, JwtConfig};
use pixelforge_api::config::{LifecycleConfig, ProviderConfig, ServerConfig};
use pixelforge_api::ingest::dedup::DedupCache;
use pixelforge_api::ingest::IngestService;
use pixelforge_api::postprocess::NoopPostProcessor;
use pixelforge_api::router::app_router;
use pixelforge_api::state::AppState;
use pixelforge_api::submission::SubmissionService;
use pixelforge_api::ws::registry::SessionRegistry;
use pixelforge_core::types::DbId;
use pixelforge_events::EventBus;
use pixelforge_provider::ProviderClient;

/// Build a test `ServerConfig` with safe defaults.
///
/// The provider base URL points at a closed local port so any fan-out
/// attempt fails fast with a connection error instead of hanging.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        jwt: JwtConfig {
            secret: "test-secret-key".to_string(),
            access_token_expiry_mins: 60,
        },
        provider: ProviderConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            api_key: "test-key".to_string(),
            model: "pf-test-1".to_string(),
            callback_base_url: "http://localhost:3000".to_string(),
        },
        lifecycle: LifecycleConfig {
            poll_interval: Duration::from_secs(30),
            reap_interval: Duration::from_secs(120),
            stuck_after: Duration::from_secs(300),
            max_check_failures: 5,
            max_retry_attempts: 3,
            submit_timeout: Duration::from_secs(2),
            dedup_ttl: Duration::from_secs(600),
            sweep_interval: Duration::from_secs(30),
        },
    }
}

/// Build the full application state over the given pool, with the same
/// wiring as `main.rs` minus the background tasks.
pub fn build_state(pool: PgPool) -> AppState {
    let config = Arc::new(test_config());
    let registry = Arc::new(SessionRegistry::new());
    let bus = Arc::new(EventBus::new(64));
    let dedup = Arc::new(DedupCache::new(config.lifecycle.dedup_ttl));
    let provider = Arc::new(ProviderClient::new(
        config.provider.base_url.clone(),
        config.provider.api_key.clone(),
    ));

    let ingest = Arc::new(IngestService::new(
        pool.clone(),
        dedup,
        bus.clone(),
        Arc::new(NoopPostProcessor),
    ));
    let submission = Arc::new(SubmissionService::new(
        pool.clone(),
        provider,
        bus.clone(),
        ingest.clone(),
        config.clone(),
    ));

    AppState {
        pool,
        config,
        registry,
        bus,
        submission,
        ingest,
    }
}

/// Build the application router with the full middleware stack, so
/// integration tests exercise the same layers production uses.
pub fn build_test_app(pool: PgPool) -> Router {
    app_router(build_state(pool))
}

/// Insert a user and return their id.
pub async fn seed_user(pool: &PgPool, display_name: &str, credit_balance: i64) -> DbId {
    sqlx::query_scalar("INSERT INTO users (display_name, credit_balance) VALUES ($1, $2) RETURNING id")
        .bind(display_name)
        .bind(credit_balance)
        .fetch_one(pool)
        .await
        .expect("seed user")
}

/// Current credit balance for a user.
pub async fn balance_of(pool: &PgPool, user_id: DbId) -> i64 {
    sqlx::query_scalar("SELECT credit_balance FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await
        .expect("user balance")
}

/// Sign an access token for a user with the test JWT config.
pub fn auth_token(user_id: DbId) -> String {
    generate_token(user_id, &test_config().jwt).expect("sign test token")
}

/// Send an authenticated JSON POST through the router.
pub async fn post_json_auth(
    app: Router,
    uri: &str,
    token: &str,
    body: Value,
) -> Response<axum::body::Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .header(AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::from(body.to_string()))
        .expect("build request");
    app.oneshot(request).await.expect("send request")
}

/// Collect a response body into JSON.
pub async fn body_json(response: Response<axum::body::Body>) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("parse body as JSON")
}

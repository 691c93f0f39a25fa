use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pixelforge_api::background::{ReconciliationPoller, StuckReaper};
use pixelforge_api::config::ServerConfig;
use pixelforge_api::ingest::dedup::DedupCache;
use pixelforge_api::ingest::IngestService;
use pixelforge_api::notifications::NotificationRouter;
use pixelforge_api::postprocess::HttpPostProcessor;
use pixelforge_api::router::app_router;
use pixelforge_api::state::AppState;
use pixelforge_api::submission::SubmissionService;
use pixelforge_api::ws;
use pixelforge_events::EventBus;
use pixelforge_provider::ProviderClient;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pixelforge_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = Arc::new(ServerConfig::from_env());
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = pixelforge_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    pixelforge_db::health_check(&pool)
        .await
        .expect("Database health check failed");

    pixelforge_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Provider client ---
    let provider = Arc::new(ProviderClient::new(
        config.provider.base_url.clone(),
        config.provider.api_key.clone(),
    ));

    // --- Notification registry + sweep ---
    let registry = Arc::new(ws::SessionRegistry::new());
    let sweep_cancel = tokio_util::sync::CancellationToken::new();
    let sweep_handle = ws::start_sweep(
        Arc::clone(&registry),
        config.lifecycle.sweep_interval,
        sweep_cancel.clone(),
    );

    // --- Event bus + notification router ---
    let bus = Arc::new(EventBus::new(1024));
    let router_cancel = tokio_util::sync::CancellationToken::new();
    let router_handle = tokio::spawn(
        NotificationRouter::new(Arc::clone(&bus), Arc::clone(&registry))
            .run(router_cancel.clone()),
    );

    // --- Lifecycle services ---
    let dedup = Arc::new(DedupCache::new(config.lifecycle.dedup_ttl));
    let postprocessor = Arc::new(HttpPostProcessor::new(reqwest::Client::new()));
    let ingest = Arc::new(IngestService::new(
        pool.clone(),
        Arc::clone(&dedup),
        Arc::clone(&bus),
        postprocessor,
    ));
    let submission = Arc::new(SubmissionService::new(
        pool.clone(),
        Arc::clone(&provider),
        Arc::clone(&bus),
        Arc::clone(&ingest),
        Arc::clone(&config),
    ));

    // --- Background tasks ---
    let task_cancel = tokio_util::sync::CancellationToken::new();
    let poller = Arc::new(ReconciliationPoller::new(
        pool.clone(),
        Arc::clone(&provider),
        Arc::clone(&ingest),
        config.lifecycle.clone(),
    ));
    let poller_handle = poller.start(task_cancel.clone());

    let reaper = Arc::new(StuckReaper::new(
        pool.clone(),
        Arc::clone(&ingest),
        config.lifecycle.clone(),
    ));
    let reaper_handle = reaper.start(task_cancel.clone());
    tracing::info!("Lifecycle tasks started (poller, reaper)");

    // --- App state + router ---
    let state = AppState {
        pool,
        config: Arc::clone(&config),
        registry: Arc::clone(&registry),
        bus: Arc::clone(&bus),
        submission,
        ingest,
    };
    let app = app_router(state);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // Stop ingest-driving tasks first so no new events are published.
    task_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), poller_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), reaper_handle).await;
    tracing::info!("Lifecycle tasks stopped");

    router_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), router_handle).await;

    sweep_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), sweep_handle).await;

    let sessions = registry.session_count().await;
    tracing::info!(sessions, "Closing remaining notification sessions");
    registry.shutdown_all().await;

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

//! Server configuration loaded from environment variables.

use std::time::Duration;

use crate::auth::jwt::JwtConfig;

/// Top-level server configuration.
///
/// All fields except `JWT_SECRET` and `PROVIDER_API_KEY` have defaults
/// suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// JWT token configuration (secret, expiry).
    pub jwt: JwtConfig,
    /// External generation provider settings.
    pub provider: ProviderConfig,
    /// Job lifecycle tuning knobs.
    pub lifecycle: LifecycleConfig,
}

/// External provider connection settings.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Provider API root, e.g. `https://api.provider.example`.
    pub base_url: String,
    /// Bearer token for the provider account.
    pub api_key: String,
    /// Model identifier sent with every submission. May legitimately be
    /// empty for a misconfigured deployment; submission then fails each
    /// variation with a configuration error rather than panicking at boot.
    pub model: String,
    /// Publicly reachable base URL for webhook callbacks,
    /// e.g. `https://pixelforge.example`.
    pub callback_base_url: String,
}

/// Lifecycle subsystem tuning.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Reconciliation poller interval (default: 30s).
    pub poll_interval: Duration,
    /// Stuck reaper interval (default: 120s).
    pub reap_interval: Duration,
    /// Age past which a non-terminal variation is considered stuck
    /// (default: 300s).
    pub stuck_after: Duration,
    /// Consecutive status-check failures before force-failing (default: 5).
    pub max_check_failures: i32,
    /// Reaper attempts before force-failing a stuck variation (default: 3).
    pub max_retry_attempts: i32,
    /// Overall submission fan-out allotment (default: 60s).
    pub submit_timeout: Duration,
    /// Per-entry dedup cache TTL (default: 600s).
    pub dedup_ttl: Duration,
    /// Registry sweep / heartbeat ping interval (default: 30s).
    pub sweep_interval: Duration,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default                 |
    /// |-----------------------------|-------------------------|
    /// | `HOST`                      | `0.0.0.0`               |
    /// | `PORT`                      | `3000`                  |
    /// | `CORS_ORIGINS`              | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`      | `30`                    |
    /// | `PROVIDER_BASE_URL`         | `http://localhost:8787` |
    /// | `PROVIDER_API_KEY`          | **required**            |
    /// | `PROVIDER_MODEL`            | *(empty)*               |
    /// | `CALLBACK_BASE_URL`         | `http://localhost:3000` |
    /// | `POLL_INTERVAL_SECS`        | `30`                    |
    /// | `REAP_INTERVAL_SECS`        | `120`                   |
    /// | `STUCK_AFTER_SECS`          | `300`                   |
    /// | `MAX_CHECK_FAILURES`        | `5`                     |
    /// | `MAX_RETRY_ATTEMPTS`        | `3`                     |
    /// | `SUBMIT_TIMEOUT_SECS`       | `60`                    |
    /// | `DEDUP_TTL_SECS`            | `600`                   |
    /// | `SWEEP_INTERVAL_SECS`       | `30`                    |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs = env_u64("REQUEST_TIMEOUT_SECS", 30);

        let provider = ProviderConfig {
            base_url: std::env::var("PROVIDER_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8787".into()),
            api_key: std::env::var("PROVIDER_API_KEY")
                .expect("PROVIDER_API_KEY must be set in the environment"),
            model: std::env::var("PROVIDER_MODEL").unwrap_or_default(),
            callback_base_url: std::env::var("CALLBACK_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".into()),
        };

        let lifecycle = LifecycleConfig {
            poll_interval: Duration::from_secs(env_u64("POLL_INTERVAL_SECS", 30)),
            reap_interval: Duration::from_secs(env_u64("REAP_INTERVAL_SECS", 120)),
            stuck_after: Duration::from_secs(env_u64("STUCK_AFTER_SECS", 300)),
            max_check_failures: env_u64("MAX_CHECK_FAILURES", 5) as i32,
            max_retry_attempts: env_u64("MAX_RETRY_ATTEMPTS", 3) as i32,
            submit_timeout: Duration::from_secs(env_u64("SUBMIT_TIMEOUT_SECS", 60)),
            dedup_ttl: Duration::from_secs(env_u64("DEDUP_TTL_SECS", 600)),
            sweep_interval: Duration::from_secs(env_u64("SWEEP_INTERVAL_SECS", 30)),
        };

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            jwt: JwtConfig::from_env(),
            provider,
            lifecycle,
        }
    }
}

/// Parse an env var as u64, falling back to `default` when unset.
///
/// # Panics
///
/// Panics when the variable is set but unparseable — a misconfigured
/// deployment should fail at boot, not at first use.
fn env_u64(name: &str, default: u64) -> u64 {
    match std::env::var(name) {
        Ok(v) => v
            .parse()
            .unwrap_or_else(|_| panic!("{name} must be a valid integer")),
        Err(_) => default,
    }
}

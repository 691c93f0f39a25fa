//! REST client for the provider HTTP API.
//!
//! Wraps job submission and status polling using [`reqwest`]. One client
//! is shared across the whole application (connection pooling).

use crate::types::{JobStatusResponse, SubmitJobRequest, SubmitJobResponse};

/// HTTP client for the generation provider.
pub struct ProviderClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

/// Errors from the provider API layer.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The provider returned a non-2xx status code.
    #[error("Provider API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// Operator-caused misconfiguration (e.g. no model identifier for the
    /// requested operation). Never retryable.
    #[error("Provider configuration error: {0}")]
    Configuration(String),
}

impl ProviderError {
    /// Whether this error is an operator problem rather than a transient
    /// provider/transport one.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

impl ProviderClient {
    /// Create a new client.
    ///
    /// * `base_url` — provider API root, e.g. `https://api.provider.example`.
    /// * `api_key`  — bearer token for the provider account.
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, base_url: String, api_key: String) -> Self {
        Self {
            client,
            base_url,
            api_key,
        }
    }

    /// Submit one generation job.
    ///
    /// Sends `POST /v1/jobs`; the provider acknowledges with an opaque
    /// `job_id` and starts work asynchronously. Completion arrives later
    /// via the webhook URL embedded in the request, or via
    /// [`job_status`](Self::job_status).
    pub async fn submit_job(
        &self,
        request: &SubmitJobRequest,
    ) -> Result<SubmitJobResponse, ProviderError> {
        if request.model.trim().is_empty() {
            return Err(ProviderError::Configuration(
                "no provider model identifier configured for this operation".into(),
            ));
        }

        let response = self
            .client
            .post(format!("{}/v1/jobs", self.base_url))
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Query the current status of a submitted job.
    ///
    /// Sends `GET /v1/jobs/{job_id}`. Used by the reconciliation poller
    /// for variations whose webhook never arrived.
    pub async fn job_status(&self, job_id: &str) -> Result<JobStatusResponse, ProviderError> {
        let response = self
            .client
            .get(format!("{}/v1/jobs/{}", self.base_url, job_id))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`ProviderError::Api`]
    /// containing the status and body text on failure.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ProviderError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

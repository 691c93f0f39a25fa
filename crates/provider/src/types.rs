//! Provider wire types and status vocabulary.
//!
//! The provider reports job state with its own vocabulary; everything the
//! lifecycle subsystem consumes is normalized into
//! [`ProviderReport`](pixelforge_core::lifecycle::ProviderReport) via
//! [`ProviderJobStatus::to_report`]. Webhook payloads and status-poll
//! responses share the same shape.

use pixelforge_core::lifecycle::ProviderReport;
use serde::{Deserialize, Serialize};

/// Status vocabulary used by the provider in webhooks and poll responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProviderJobStatus {
    InQueue,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl ProviderJobStatus {
    /// Normalize a provider status plus its accompanying fields into an
    /// internal report.
    ///
    /// A `COMPLETED` status without any output reference is treated as a
    /// failure — a success transition must carry artifacts. Provider-side
    /// cancellation maps to failure with a distinguishable reason.
    pub fn to_report(
        self,
        output: Option<serde_json::Value>,
        error: Option<String>,
    ) -> ProviderReport {
        match self {
            Self::InQueue => ProviderReport::Queued,
            Self::InProgress => ProviderReport::Running,
            Self::Completed => match output {
                Some(outputs) if !outputs.is_null() => ProviderReport::Succeeded { outputs },
                _ => ProviderReport::Failed {
                    reason: "provider reported success without output".into(),
                },
            },
            Self::Failed => ProviderReport::Failed {
                reason: error.unwrap_or_else(|| "provider reported failure".into()),
            },
            Self::Cancelled => ProviderReport::Failed {
                reason: error.unwrap_or_else(|| "cancelled by provider".into()),
            },
        }
    }
}

/// Request body for `POST /v1/jobs`.
#[derive(Debug, Serialize)]
pub struct SubmitJobRequest {
    /// Provider model identifier (operator-configured).
    pub model: String,
    /// Operation kind (e.g. `"generate"`, `"edit"`, `"upscale"`).
    pub operation: String,
    /// Operation-specific parameters: prompt, source artifact references,
    /// numeric knobs. Passed through opaquely.
    pub params: serde_json::Value,
    /// Callback address embedding the variation id and correlation id.
    pub webhook_url: String,
}

/// Response body from `POST /v1/jobs`.
#[derive(Debug, Deserialize)]
pub struct SubmitJobResponse {
    /// Opaque handle identifying the job on the provider.
    pub job_id: String,
    pub status: ProviderJobStatus,
}

/// Response body from `GET /v1/jobs/{id}` (status poll).
#[derive(Debug, Deserialize)]
pub struct JobStatusResponse {
    pub job_id: String,
    pub status: ProviderJobStatus,
    #[serde(default)]
    pub output: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl JobStatusResponse {
    /// Normalize into an internal report.
    pub fn to_report(&self) -> ProviderReport {
        self.status.to_report(self.output.clone(), self.error.clone())
    }
}

/// Inbound webhook body POSTed by the provider to our callback URL.
///
/// The variation is identified by the callback path, not the body; the
/// body carries the provider's view of the job.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    /// The provider's job handle (`externalJobId` on the wire).
    #[serde(rename = "externalJobId", alias = "job_id")]
    pub external_job_id: String,
    pub status: ProviderJobStatus,
    #[serde(default)]
    pub output: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl WebhookPayload {
    /// Normalize into an internal report.
    pub fn to_report(&self) -> ProviderReport {
        self.status.to_report(self.output.clone(), self.error.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn completed_with_output_maps_to_succeeded() {
        let report = ProviderJobStatus::Completed
            .to_report(Some(json!(["https://cdn.example/a.png"])), None);
        assert_matches!(report, ProviderReport::Succeeded { .. });
    }

    #[test]
    fn completed_without_output_maps_to_failed() {
        // A success transition must carry artifact references.
        assert_matches!(
            ProviderJobStatus::Completed.to_report(None, None),
            ProviderReport::Failed { .. }
        );
        assert_matches!(
            ProviderJobStatus::Completed.to_report(Some(serde_json::Value::Null), None),
            ProviderReport::Failed { .. }
        );
    }

    #[test]
    fn failed_carries_provider_reason() {
        let report =
            ProviderJobStatus::Failed.to_report(None, Some("CUDA out of memory".into()));
        assert_matches!(report, ProviderReport::Failed { reason } if reason == "CUDA out of memory");
    }

    #[test]
    fn webhook_payload_deserializes_wire_field_names() {
        let payload: WebhookPayload = serde_json::from_str(
            r#"{"externalJobId": "job-123", "status": "COMPLETED",
                "output": ["https://cdn.example/out.png"]}"#,
        )
        .expect("payload should parse");
        assert_eq!(payload.external_job_id, "job-123");
        assert_eq!(payload.status, ProviderJobStatus::Completed);
    }

    #[test]
    fn intermediate_statuses_map_to_progress_reports() {
        assert_eq!(
            ProviderJobStatus::InQueue.to_report(None, None),
            ProviderReport::Queued
        );
        assert_eq!(
            ProviderJobStatus::InProgress.to_report(None, None),
            ProviderReport::Running
        );
    }
}

//! Ingestion decision logic for provider reports.
//!
//! Webhook callbacks and reconciliation poll responses both reduce to a
//! [`ProviderReport`]. [`apply_report`] decides, from the variation's
//! current status and the report, what (if anything) must be written —
//! without touching the database, so the decision table is directly
//! unit-testable.
//!
//! The caller (webhook ingestion or the poller) is responsible for
//! performing the write with a status guard so that at most one writer
//! wins a terminal transition.

use serde::{Deserialize, Serialize};

use crate::status::VariationStatus;

/// Machine-readable failure classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Operator-caused (e.g. missing model identifier). Never retryable.
    Configuration,
    /// Network/transport failure while submitting. Refundable.
    Transport,
    /// The provider ran the job and reported failure. Refundable.
    Execution,
    /// Repeated status-check failures exhausted the retry budget.
    Unreachable,
    /// Non-terminal past the age threshold with attempts exhausted.
    TimedOut,
}

impl ErrorKind {
    /// The text code stored in the `variations.error_kind` column.
    pub fn code(self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Transport => "transport",
            Self::Execution => "execution",
            Self::Unreachable => "unreachable",
            Self::TimedOut => "timed_out",
        }
    }
}

/// A provider-reported state for one external job, normalized from either
/// a webhook payload or a status-poll response.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderReport {
    /// Accepted, waiting in the provider's queue.
    Queued,
    /// Actively generating.
    Running,
    /// Finished successfully with output references.
    Succeeded { outputs: serde_json::Value },
    /// Finished unsuccessfully with a provider-supplied reason.
    Failed { reason: String },
}

impl ProviderReport {
    /// Whether this report describes a terminal outcome.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::Failed { .. })
    }

    /// Short status label used in dedup keys and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded { .. } => "succeeded",
            Self::Failed { .. } => "failed",
        }
    }
}

/// The write (or non-write) an ingestion path must perform for a report.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestAction {
    /// Duplicate or late event; acknowledge and do nothing.
    Ignore,
    /// Non-terminal progress update to the given status.
    Progress(VariationStatus),
    /// Terminal success: write `COMPLETED` with these outputs.
    Complete { outputs: serde_json::Value },
    /// Terminal failure: write `FAILED` with this reason.
    Fail { reason: String, kind: ErrorKind },
}

/// Decide what to do with a provider report given the variation's current
/// status.
///
/// Terminal-on-terminal is treated as a duplicate regardless of the dedup
/// cache (payload ids can differ across retries of the same logical
/// event). Out-of-order intermediate reports that the state machine
/// rejects (e.g. `queued` arriving after `running`) are ignored rather
/// than rewound.
pub fn apply_report(current: VariationStatus, report: &ProviderReport) -> IngestAction {
    if current.is_terminal() {
        return IngestAction::Ignore;
    }

    match report {
        ProviderReport::Queued => {
            if current.can_transition_to(VariationStatus::InQueue) {
                IngestAction::Progress(VariationStatus::InQueue)
            } else {
                IngestAction::Ignore
            }
        }
        ProviderReport::Running => {
            if current.can_transition_to(VariationStatus::Processing) {
                IngestAction::Progress(VariationStatus::Processing)
            } else {
                IngestAction::Ignore
            }
        }
        ProviderReport::Succeeded { outputs } => IngestAction::Complete {
            outputs: outputs.clone(),
        },
        ProviderReport::Failed { reason } => IngestAction::Fail {
            reason: reason.clone(),
            kind: ErrorKind::Execution,
        },
    }
}

/// Whether a variation whose status checks keep erroring should be
/// force-failed instead of retried again.
pub fn check_budget_exhausted(consecutive_failures: i32, max_failures: i32) -> bool {
    consecutive_failures >= max_failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn terminal_current_ignores_any_report() {
        for current in [VariationStatus::Completed, VariationStatus::Failed] {
            for report in [
                ProviderReport::Queued,
                ProviderReport::Running,
                ProviderReport::Succeeded {
                    outputs: json!(["https://cdn.example/out.png"]),
                },
                ProviderReport::Failed {
                    reason: "oom".into(),
                },
            ] {
                assert_eq!(apply_report(current, &report), IngestAction::Ignore);
            }
        }
    }

    #[test]
    fn success_report_completes_from_any_non_terminal() {
        let outputs = json!(["https://cdn.example/a.png", "https://cdn.example/b.png"]);
        for current in [
            VariationStatus::Submitted,
            VariationStatus::InQueue,
            VariationStatus::Processing,
        ] {
            // Even SUBMITTED: the webhook can outrun the submission path's
            // own IN_QUEUE write.
            assert_matches!(
                apply_report(current, &ProviderReport::Succeeded { outputs: outputs.clone() }),
                IngestAction::Complete { .. }
            );
        }
    }

    #[test]
    fn failure_report_fails_with_execution_kind() {
        let action = apply_report(
            VariationStatus::Processing,
            &ProviderReport::Failed {
                reason: "CUDA out of memory".into(),
            },
        );
        assert_matches!(
            action,
            IngestAction::Fail { ref reason, kind: ErrorKind::Execution }
                if reason == "CUDA out of memory"
        );
    }

    #[test]
    fn stale_queued_after_running_is_ignored() {
        // No cross-variation (or intra-variation) ordering guarantee from
        // the provider: a late `queued` must not rewind `PROCESSING`.
        assert_eq!(
            apply_report(VariationStatus::Processing, &ProviderReport::Queued),
            IngestAction::Ignore
        );
    }

    #[test]
    fn running_advances_queue_to_processing() {
        assert_eq!(
            apply_report(VariationStatus::InQueue, &ProviderReport::Running),
            IngestAction::Progress(VariationStatus::Processing)
        );
    }

    #[test]
    fn applying_same_terminal_report_twice_is_idempotent() {
        // First application completes; once the caller has written
        // COMPLETED, the identical report is ignored.
        let report = ProviderReport::Succeeded {
            outputs: json!(["https://cdn.example/out.png"]),
        };
        assert_matches!(
            apply_report(VariationStatus::Processing, &report),
            IngestAction::Complete { .. }
        );
        assert_eq!(
            apply_report(VariationStatus::Completed, &report),
            IngestAction::Ignore
        );
    }

    #[test]
    fn out_of_order_terminals_are_order_independent() {
        // Scenario: variation 2's webhook lands before variation 1's.
        // Each variation decides independently of the other, so applying
        // the same pair of reports in either order yields the same pair
        // of actions.
        let success = ProviderReport::Succeeded {
            outputs: json!(["https://cdn.example/v.png"]),
        };
        let a = apply_report(VariationStatus::InQueue, &success);
        let b = apply_report(VariationStatus::Processing, &success);
        assert_matches!(a, IngestAction::Complete { .. });
        assert_matches!(b, IngestAction::Complete { .. });
    }

    #[test]
    fn check_budget_boundary() {
        assert!(!check_budget_exhausted(2, 3));
        assert!(check_budget_exhausted(3, 3));
        assert!(check_budget_exhausted(4, 3));
    }
}

//! Variation and batch lifecycle statuses.
//!
//! Statuses are stored as text codes in the database (see
//! [`VariationStatus::code`]); every literal used in SQL comes from here.
//!
//! The variation state machine:
//!
//! ```text
//! SUBMITTED -> { IN_QUEUE | FAILED }
//! IN_QUEUE  -> { PROCESSING | COMPLETED | FAILED }
//! PROCESSING -> { COMPLETED | FAILED }
//! ```
//!
//! `COMPLETED` and `FAILED` are terminal. `CANCELLED` is a local-only
//! terminal state set when the user stops tracking a batch; it is never
//! produced by provider reports.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a single variation (one unit of generated output).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VariationStatus {
    /// Allocated locally, not yet accepted by the provider.
    Submitted,
    /// Accepted by the provider and waiting in its queue.
    InQueue,
    /// Actively generating on the provider.
    Processing,
    /// Finished with output artifacts. Terminal.
    Completed,
    /// Finished without output. Terminal.
    Failed,
    /// Local tracking stopped by the user. Terminal, local-only.
    Cancelled,
}

impl VariationStatus {
    /// The text code stored in the `variations.status` column.
    pub fn code(self) -> &'static str {
        match self {
            Self::Submitted => "SUBMITTED",
            Self::InQueue => "IN_QUEUE",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Parse a stored text code back into a status.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "SUBMITTED" => Some(Self::Submitted),
            "IN_QUEUE" => Some(Self::InQueue),
            "PROCESSING" => Some(Self::Processing),
            "COMPLETED" => Some(Self::Completed),
            "FAILED" => Some(Self::Failed),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// `COMPLETED`, `FAILED`, and `CANCELLED` admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether the state machine permits moving from `self` to `to`.
    pub fn can_transition_to(self, to: VariationStatus) -> bool {
        use VariationStatus::*;
        match (self, to) {
            (Submitted, InQueue | Failed | Cancelled) => true,
            (InQueue, Processing | Completed | Failed | Cancelled) => true,
            (Processing, Completed | Failed | Cancelled) => true,
            _ => false,
        }
    }

    /// Status codes that count as terminal, for SQL `NOT IN` guards.
    pub const TERMINAL_CODES: [&'static str; 3] = ["COMPLETED", "FAILED", "CANCELLED"];
}

/// Aggregate status of a batch, derived from its variations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    /// At least one variation is still non-terminal.
    Processing,
    /// Every variation completed.
    Completed,
    /// Every variation is terminal, outcomes mixed.
    PartiallyCompleted,
    /// Every variation failed (or was cancelled).
    Failed,
}

impl BatchStatus {
    /// The text code stored in the `batches.status` column.
    pub fn code(self) -> &'static str {
        match self {
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::PartiallyCompleted => "PARTIALLY_COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    /// Parse a stored text code back into a status.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "PROCESSING" => Some(Self::Processing),
            "COMPLETED" => Some(Self::Completed),
            "PARTIALLY_COMPLETED" => Some(Self::PartiallyCompleted),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Whether the batch needs no further aggregation.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Processing)
    }
}

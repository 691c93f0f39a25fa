//! Batch status derivation.
//!
//! The aggregate is always recomputed from the full, authoritative set of
//! variation statuses — never by incrementing counters — so two
//! variations completing concurrently cannot produce conflicting writes.

use crate::status::{BatchStatus, VariationStatus};

/// Derive a batch's aggregate status from its variations.
///
/// Rules:
/// - any non-terminal variation → `Processing` (the batch is still live);
/// - all terminal, all `COMPLETED` → `Completed`;
/// - all terminal, none `COMPLETED` → `Failed`;
/// - all terminal, mixed → `PartiallyCompleted`.
///
/// `CANCELLED` counts as a non-completion for aggregation purposes.
/// An empty set stays `Processing`; a batch is never created without
/// variations, so this only arises transiently mid-allocation.
pub fn batch_status(variations: &[VariationStatus]) -> BatchStatus {
    if variations.is_empty() || variations.iter().any(|s| !s.is_terminal()) {
        return BatchStatus::Processing;
    }

    let completed = variations
        .iter()
        .filter(|s| **s == VariationStatus::Completed)
        .count();

    if completed == variations.len() {
        BatchStatus::Completed
    } else if completed == 0 {
        BatchStatus::Failed
    } else {
        BatchStatus::PartiallyCompleted
    }
}

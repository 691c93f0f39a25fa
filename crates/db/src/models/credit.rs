//! Credit ledger entry model.

use pixelforge_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `credit_ledger` table.
///
/// Negative `delta` is a charge, positive a refund. Every row carries a
/// human-readable `reason`.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct LedgerEntry {
    pub id: DbId,
    pub user_id: DbId,
    pub batch_id: Option<DbId>,
    pub delta: i64,
    pub reason: String,
    pub created_at: Timestamp,
}

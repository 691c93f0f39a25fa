//! Minimal user model (identity + credit balance).
//!
//! Authentication itself is external; this row exists so batches and the
//! credit ledger have an owner to reference.

use pixelforge_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `users` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: DbId,
    pub display_name: String,
    pub credit_balance: i64,
    pub created_at: Timestamp,
}

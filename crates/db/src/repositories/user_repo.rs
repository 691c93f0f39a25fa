//! Repository for the `users` table.

use pixelforge_core::types::DbId;
use sqlx::PgPool;

use crate::models::user::User;

/// Column list for `users` queries.
const COLUMNS: &str = "id, display_name, credit_balance, created_at";

/// Minimal user lookups; identity management itself is external.
pub struct UserRepo;

impl UserRepo {
    /// Find a user by ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<User>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}

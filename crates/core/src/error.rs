use crate::types::DbId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Insufficient credits: need {needed}, have {available}")]
    InsufficientCredits { needed: i64, available: i64 },

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: &'static str, to: &'static str },

    #[error("Internal error: {0}")]
    Internal(String),
}

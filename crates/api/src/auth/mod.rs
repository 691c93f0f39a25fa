//! JWT authentication: token validation and the [`AuthUser`] extractor.
//!
//! Identity management (signup, passwords, token issuance UIs) is
//! external; this module only verifies bearer tokens minted by that
//! system and exposes the authenticated user id to handlers.

pub mod extract;
pub mod jwt;

pub use extract::AuthUser;
pub use jwt::{Claims, JwtConfig};

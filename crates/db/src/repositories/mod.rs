//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument. Every status literal bound in
//! SQL comes from the `pixelforge_core::status` enums.

pub mod batch_repo;
pub mod credit_repo;
pub mod user_repo;
pub mod variation_repo;

pub use batch_repo::BatchRepo;
pub use credit_repo::CreditRepo;
pub use user_repo::UserRepo;
pub use variation_repo::VariationRepo;

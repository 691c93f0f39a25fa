//! Domain model structs and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - `Deserialize` DTOs for the operations that create or update it

pub mod batch;
pub mod credit;
pub mod user;
pub mod variation;

pub use batch::{Batch, BatchWithVariations, CreateBatch};
pub use credit::LedgerEntry;
pub use user::User;
pub use variation::Variation;

//! Pixelforge domain logic.
//!
//! Pure, I/O-free building blocks shared by every other crate:
//!
//! - [`types`] — ID and timestamp aliases.
//! - [`error`] — the [`CoreError`](error::CoreError) domain error enum.
//! - [`status`] — variation/batch status enums and the transition rules.
//! - [`lifecycle`] — the webhook/poll ingestion decision function.
//! - [`aggregate`] — batch status derivation from variation statuses.
//! - [`credits`] — refund arithmetic.

pub mod aggregate;
pub mod credits;
pub mod error;
pub mod lifecycle;
pub mod status;
pub mod types;

//! HTTP handlers, grouped by resource.

pub mod batches;
pub mod credits;
pub mod generate;
pub mod health;
pub mod webhook;

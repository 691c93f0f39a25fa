//! Pixelforge API server library.
//!
//! Exposes the building blocks (config, state, error handling, handlers,
//! WebSocket infrastructure, lifecycle services) so integration tests and
//! the binary entrypoint can both access them.

pub mod auth;
pub mod background;
pub mod config;
pub mod credits;
pub mod error;
pub mod handlers;
pub mod ingest;
pub mod notifications;
pub mod postprocess;
pub mod response;
pub mod router;
pub mod state;
pub mod submission;
pub mod ws;

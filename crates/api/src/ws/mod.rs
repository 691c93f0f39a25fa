//! WebSocket infrastructure for real-time notification delivery.
//!
//! - [`registry`] — the per-user single-session registry.
//! - [`handler`] — the HTTP upgrade handler and per-connection pumps.
//! - [`sweep`] — periodic registry reconciliation and server pings.

pub mod handler;
pub mod registry;
pub mod sweep;

pub use handler::ws_handler;
pub use registry::{SendOutcome, SessionRegistry};
pub use sweep::start_sweep;

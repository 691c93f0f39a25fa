//! Background lifecycle tasks.
//!
//! - [`poller`] — reconciles in-flight variations whose webhook never
//!   arrived by polling the provider directly.
//! - [`reaper`] — force-fails variations stuck non-terminal past the age
//!   threshold once their retry budget is spent.
//!
//! Both follow the same shape: a `tokio::spawn`ed loop driven by an
//! interval and stopped by a [`CancellationToken`], with a single-flight
//! guard so a slow tick is skipped rather than stacked.

pub mod poller;
pub mod reaper;

pub use poller::ReconciliationPoller;
pub use reaper::StuckReaper;

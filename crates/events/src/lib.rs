//! In-process event bus and the client-facing notification envelope.
//!
//! Lifecycle code (submission, webhook ingestion, the poller) publishes
//! [`ClientEvent`]s to the [`EventBus`]; the notification router consumes
//! them and forwards each to the target user's live session. Delivery is
//! best-effort: events are never persisted or replayed.

pub mod bus;
pub mod event;

pub use bus::EventBus;
pub use event::{ClientEvent, ClientEventType};

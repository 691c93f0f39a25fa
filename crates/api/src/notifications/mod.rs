//! Client notification delivery.

pub mod router;

pub use router::NotificationRouter;

//! Event-bus to WebSocket bridge.
//!
//! One background task subscribes to the [`EventBus`] and forwards each
//! event to its target user's live session. A user without a session is
//! an explicit, logged miss rather than an error: delivery is strictly
//! best-effort and nothing is queued for later.

use std::sync::Arc;

use pixelforge_events::EventBus;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use crate::ws::registry::{SendOutcome, SessionRegistry};

pub struct NotificationRouter {
    bus: Arc<EventBus>,
    registry: Arc<SessionRegistry>,
}

impl NotificationRouter {
    pub fn new(bus: Arc<EventBus>, registry: Arc<SessionRegistry>) -> Self {
        Self { bus, registry }
    }

    /// Consume the bus until shutdown.
    ///
    /// A lagged receiver (the bus outran this consumer) drops the missed
    /// events and keeps going; clients recover current state by query,
    /// not by event replay.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut receiver = self.bus.subscribe();
        tracing::info!("Notification router started");

        loop {
            tokio::select! {
                result = receiver.recv() => match result {
                    Ok(event) => {
                        match self.registry.send(&event).await {
                            SendOutcome::Delivered => {}
                            SendOutcome::Offline => {
                                tracing::debug!(
                                    user_id = event.user_id,
                                    event_type = ?event.event_type,
                                    "No live session for event, dropping"
                                );
                            }
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "Notification router lagged, events dropped");
                    }
                    Err(RecvError::Closed) => {
                        tracing::info!("Event bus closed, notification router stopping");
                        break;
                    }
                },
                _ = shutdown.cancelled() => {
                    tracing::info!("Notification router shutting down");
                    break;
                }
            }
        }
    }
}

//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the publish/subscribe hub for [`ClientEvent`]s. It is
//! designed to be shared via `Arc<EventBus>` across the application.

use tokio::sync::broadcast;

use crate::event::ClientEvent;

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// Wraps a [`broadcast::Sender`] so that any number of subscribers can
/// independently receive every published [`ClientEvent`].
pub struct EventBus {
    sender: broadcast::Sender<ClientEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are
    /// dropped and slow receivers observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped —
    /// delivery is best-effort by design.
    pub fn publish(&self, event: ClientEvent) {
        // Ignore the SendError — it only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ClientEventType;
    use serde_json::json;

    #[tokio::test]
    async fn publish_and_receive_single_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(ClientEvent::new(
            42,
            ClientEventType::VariationCompleted,
            json!({"variation_id": 9}),
        ));

        let received = rx.recv().await.expect("should receive the event");
        assert_eq!(received.user_id, 42);
        assert_eq!(received.event_type, ClientEventType::VariationCompleted);
        assert_eq!(received.data["variation_id"], 9);
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(ClientEvent::new(1, ClientEventType::Progress, json!({})));

        assert_eq!(rx1.recv().await.unwrap().user_id, 1);
        assert_eq!(rx2.recv().await.unwrap().user_id, 1);
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::default();
        // No subscribers — this must not panic.
        bus.publish(ClientEvent::new(1, ClientEventType::GenerationStarted, json!({})));
    }
}

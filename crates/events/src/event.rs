//! The typed notification envelope delivered to clients.

use chrono::{DateTime, Utc};
use pixelforge_core::types::DbId;
use serde::{Deserialize, Serialize};

/// Kinds of events pushed to a client's live session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientEventType {
    /// A batch submission was accepted and work has started.
    GenerationStarted,
    /// A variation moved into active generation.
    VariationStarted,
    /// A variation finished with output.
    VariationCompleted,
    /// A variation finished without output.
    VariationFailed,
    /// Intermediate progress (queue position, step counts).
    Progress,
}

/// An event addressed to one user, delivered to their current session.
///
/// `user_id` is routing metadata and is not serialized to the wire; the
/// client receives `{ type, data, timestamp }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientEvent {
    /// Target user. Skipped on the wire.
    #[serde(skip)]
    pub user_id: DbId,

    #[serde(rename = "type")]
    pub event_type: ClientEventType,

    /// Event-specific payload (batch id, variation id, outputs, reason).
    pub data: serde_json::Value,

    /// When the event was created (UTC).
    pub timestamp: DateTime<Utc>,
}

impl ClientEvent {
    /// Create an event for a user with the given payload.
    pub fn new(user_id: DbId, event_type: ClientEventType, data: serde_json::Value) -> Self {
        Self {
            user_id,
            event_type,
            data,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_format_has_type_data_timestamp_but_no_user() {
        let event = ClientEvent::new(
            7,
            ClientEventType::VariationCompleted,
            json!({"variation_id": 3, "batch_id": 1}),
        );

        let wire = serde_json::to_value(&event).expect("serializes");
        assert_eq!(wire["type"], "variation_completed");
        assert_eq!(wire["data"]["variation_id"], 3);
        assert!(wire.get("timestamp").is_some());
        assert!(wire.get("user_id").is_none(), "user_id must not leak to the wire");
    }

    #[test]
    fn event_type_names_are_snake_case() {
        for (ty, name) in [
            (ClientEventType::GenerationStarted, "generation_started"),
            (ClientEventType::VariationStarted, "variation_started"),
            (ClientEventType::VariationCompleted, "variation_completed"),
            (ClientEventType::VariationFailed, "variation_failed"),
            (ClientEventType::Progress, "progress"),
        ] {
            assert_eq!(serde_json::to_value(ty).unwrap(), name);
        }
    }
}

//! Unit tests for `SessionRegistry`.
//!
//! These tests exercise the notification registry directly, without any
//! HTTP upgrades. They verify the one-session-per-user invariant,
//! supersede and stale-unregister semantics, delivery outcomes, and the
//! sweep's orphan recovery and stale cleanup.

use axum::extract::ws::Message;
use pixelforge_api::ws::{SendOutcome, SessionRegistry};
use pixelforge_events::{ClientEvent, ClientEventType};
use serde_json::json;

fn event_for(user_id: i64) -> ClientEvent {
    ClientEvent::new(
        user_id,
        ClientEventType::VariationCompleted,
        json!({ "variation_id": 1 }),
    )
}

// ---------------------------------------------------------------------------
// Test: new registry starts with zero sessions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn new_registry_has_zero_sessions() {
    let registry = SessionRegistry::new();

    assert_eq!(registry.session_count().await, 0);
}

// ---------------------------------------------------------------------------
// Test: register() stores at most one session per user
// ---------------------------------------------------------------------------

#[tokio::test]
async fn second_register_supersedes_first() {
    let registry = SessionRegistry::new();

    let mut rx1 = registry.register(1, "s1".to_string()).await;
    let _rx2 = registry.register(1, "s2".to_string()).await;

    // Still exactly one session for the user.
    assert_eq!(registry.session_count().await, 1);
    assert_eq!(registry.reconnect_count(1).await, Some(1));

    // The superseded session got a Close frame with the supersede reason.
    let msg = rx1.recv().await.expect("s1 should receive Close");
    match msg {
        Message::Close(Some(frame)) => assert_eq!(frame.reason.as_str(), "superseded"),
        other => panic!("Expected Close with reason, got: {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Test: events go to the newest session only
// ---------------------------------------------------------------------------

#[tokio::test]
async fn send_reaches_only_the_newest_session() {
    let registry = SessionRegistry::new();

    let mut rx1 = registry.register(1, "s1".to_string()).await;
    let mut rx2 = registry.register(1, "s2".to_string()).await;

    // Drain the Close frame delivered to the superseded session.
    let _ = rx1.recv().await;

    assert_eq!(registry.send(&event_for(1)).await, SendOutcome::Delivered);

    let msg = rx2.recv().await.expect("s2 should receive the event");
    match msg {
        Message::Text(text) => {
            let value: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
            assert_eq!(value["type"], "variation_completed");
        }
        other => panic!("Expected Text, got: {other:?}"),
    }

    // Nothing further for the old session.
    assert!(rx1.try_recv().is_err());
}

// ---------------------------------------------------------------------------
// Test: stale unregister from a superseded session is a no-op
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stale_unregister_does_not_evict_newer_session() {
    let registry = SessionRegistry::new();

    let _rx1 = registry.register(1, "s1".to_string()).await;
    let mut rx2 = registry.register(1, "s2".to_string()).await;

    // The old connection's teardown fires after the new session is live.
    registry.unregister(1, "s1").await;

    assert_eq!(registry.session_count().await, 1);
    assert_eq!(registry.send(&event_for(1)).await, SendOutcome::Delivered);
    assert!(matches!(rx2.recv().await, Some(Message::Text(_))));
}

// ---------------------------------------------------------------------------
// Test: matching unregister removes the session
// ---------------------------------------------------------------------------

#[tokio::test]
async fn matching_unregister_removes_session() {
    let registry = SessionRegistry::new();

    let _rx = registry.register(1, "s1".to_string()).await;
    registry.unregister(1, "s1").await;

    assert_eq!(registry.session_count().await, 0);
    assert_eq!(registry.send(&event_for(1)).await, SendOutcome::Offline);
}

// ---------------------------------------------------------------------------
// Test: send to a user with no session is an explicit Offline
// ---------------------------------------------------------------------------

#[tokio::test]
async fn send_without_session_is_offline() {
    let registry = SessionRegistry::new();

    assert_eq!(registry.send(&event_for(42)).await, SendOutcome::Offline);
}

// ---------------------------------------------------------------------------
// Test: send evicts a session whose channel has closed
// ---------------------------------------------------------------------------

#[tokio::test]
async fn send_evicts_dead_session() {
    let registry = SessionRegistry::new();

    let rx = registry.register(1, "s1".to_string()).await;
    drop(rx);

    assert_eq!(registry.send(&event_for(1)).await, SendOutcome::Offline);
    assert_eq!(registry.session_count().await, 0);
}

// ---------------------------------------------------------------------------
// Test: heartbeat updates the liveness timestamp
// ---------------------------------------------------------------------------

#[tokio::test]
async fn heartbeat_advances_last_heartbeat() {
    let registry = SessionRegistry::new();

    let _rx = registry.register(1, "s1".to_string()).await;
    let before = registry.last_heartbeat(1).await.expect("session exists");

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    registry.heartbeat(1).await;

    let after = registry.last_heartbeat(1).await.expect("session exists");
    assert!(after > before);
}

// ---------------------------------------------------------------------------
// Test: sweep evicts sessions with closed channels
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sweep_evicts_closed_sessions() {
    let registry = SessionRegistry::new();

    let rx = registry.register(1, "s1".to_string()).await;
    let _rx2 = registry.register(2, "s2".to_string()).await;
    drop(rx);

    let (readmitted, evicted) = registry.sweep().await;

    assert_eq!(readmitted, 0);
    assert_eq!(evicted, 1);
    assert_eq!(registry.session_count().await, 1);
    assert_eq!(registry.send(&event_for(2)).await, SendOutcome::Delivered);
}

// ---------------------------------------------------------------------------
// Test: sweep re-admits an orphaned open connection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sweep_readmits_orphaned_connection() {
    let registry = SessionRegistry::new();

    // Open connection, then lose the per-user entry through a mismatched
    // eviction path: a second session registers and is then unregistered,
    // leaving the first connection open at the transport level but with
    // no registry entry for the user.
    let mut rx1 = registry.register(1, "s1".to_string()).await;
    let _rx2 = registry.register(1, "s2".to_string()).await;
    let _ = rx1.recv().await; // drain the supersede Close
    registry.unregister(1, "s2").await;

    assert_eq!(registry.session_count().await, 0);
    assert_eq!(registry.send(&event_for(1)).await, SendOutcome::Offline);

    let (readmitted, _evicted) = registry.sweep().await;

    assert_eq!(readmitted, 1);
    assert_eq!(registry.session_count().await, 1);
    assert_eq!(registry.send(&event_for(1)).await, SendOutcome::Delivered);
    assert!(matches!(rx1.recv().await, Some(Message::Text(_))));
}

// ---------------------------------------------------------------------------
// Test: shutdown_all sends Close and clears the registry
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_all_sends_close_and_clears() {
    let registry = SessionRegistry::new();

    let mut rx1 = registry.register(1, "s1".to_string()).await;
    let mut rx2 = registry.register(2, "s2".to_string()).await;
    assert_eq!(registry.session_count().await, 2);

    registry.shutdown_all().await;

    assert_eq!(registry.session_count().await, 0);
    assert!(matches!(rx1.recv().await, Some(Message::Close(None))));
    assert!(matches!(rx2.recv().await, Some(Message::Close(None))));
}

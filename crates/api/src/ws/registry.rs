//! Per-user single-session notification registry.
//!
//! The registry holds at most one *open* session per user id at any
//! instant: registering a new session for a user supersedes (closes) any
//! prior one, and an unregister from an already-superseded session is a
//! no-op. Delivery via [`SessionRegistry::send`] is best-effort and
//! transient — a user with no live session simply misses the event, and
//! the miss is an explicit, observable [`SendOutcome`], not an error.
//!
//! Two maps are kept: the per-user registry itself, and a transport-level
//! map of every open connection keyed by session id. The periodic
//! [`sweep`](SessionRegistry::sweep) reconciles the two: transport-open
//! sessions missing from the registry are re-admitted (orphan recovery)
//! and registry entries whose channel has closed are evicted (stale
//! cleanup).
//!
//! Thread-safe via interior `RwLock`; designed to be wrapped in `Arc` and
//! shared across the application.

use std::collections::HashMap;

use axum::extract::ws::{CloseFrame, Message};
use pixelforge_core::types::{DbId, Timestamp};
use pixelforge_events::ClientEvent;
use tokio::sync::{mpsc, RwLock};

/// Channel sender half for pushing messages to a WebSocket connection.
pub type SessionSender = mpsc::UnboundedSender<Message>;

/// Close reason sent when a newer session replaces this one.
const CLOSE_REASON_SUPERSEDED: &str = "superseded";

/// Result of a delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The event was handed to the user's live session.
    Delivered,
    /// No open session for this user; the event was dropped.
    Offline,
}

/// The user's current live session.
struct Session {
    session_id: String,
    sender: SessionSender,
    connected_at: Timestamp,
    last_heartbeat: Timestamp,
    /// How many times this user's session has been superseded.
    reconnects: u32,
}

/// A transport-level connection, tracked independently of the per-user
/// mapping so the sweep can recover orphans.
struct TransportConn {
    user_id: DbId,
    sender: SessionSender,
}

/// Maintains at most one live notification session per user.
pub struct SessionRegistry {
    active: RwLock<HashMap<DbId, Session>>,
    transport: RwLock<HashMap<String, TransportConn>>,
}

impl SessionRegistry {
    /// Create a new, empty registry.
    pub fn new() -> Self {
        Self {
            active: RwLock::new(HashMap::new()),
            transport: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new session for a user, superseding any existing one.
    ///
    /// Returns the receiver half of the session's message channel so the
    /// caller can pump messages to the WebSocket sink. The superseded
    /// session (if any) receives a Close frame with reason `superseded`.
    pub async fn register(
        &self,
        user_id: DbId,
        session_id: String,
    ) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        let now = chrono::Utc::now();

        self.transport.write().await.insert(
            session_id.clone(),
            TransportConn {
                user_id,
                sender: tx.clone(),
            },
        );

        let mut active = self.active.write().await;
        let reconnects = match active.remove(&user_id) {
            Some(old) => {
                tracing::info!(
                    user_id,
                    old_session = %old.session_id,
                    new_session = %session_id,
                    "Superseding existing session"
                );
                let _ = old.sender.send(Message::Close(Some(CloseFrame {
                    code: axum::extract::ws::close_code::NORMAL,
                    reason: CLOSE_REASON_SUPERSEDED.into(),
                })));
                old.reconnects + 1
            }
            None => 0,
        };

        active.insert(
            user_id,
            Session {
                session_id,
                sender: tx,
                connected_at: now,
                last_heartbeat: now,
                reconnects,
            },
        );

        rx
    }

    /// Remove a session's mappings when its connection ends.
    ///
    /// The per-user entry is removed only if `session_id` is still the
    /// one currently stored — a stale unregister from an old, superseded
    /// session must not evict the newer one.
    pub async fn unregister(&self, user_id: DbId, session_id: &str) {
        self.transport.write().await.remove(session_id);

        let mut active = self.active.write().await;
        if let Some(session) = active.get(&user_id) {
            if session.session_id == session_id {
                active.remove(&user_id);
            }
        }
    }

    /// Deliver an event to the user's current session.
    ///
    /// A user without an open session gets [`SendOutcome::Offline`] and
    /// the event is dropped — no queueing, no retry. A session whose
    /// channel turns out to be closed is evicted on the spot and also
    /// reported as offline.
    pub async fn send(&self, event: &ClientEvent) -> SendOutcome {
        let payload = match serde_json::to_string(event) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize client event");
                return SendOutcome::Offline;
            }
        };

        let mut active = self.active.write().await;
        match active.get(&event.user_id) {
            Some(session) => {
                if session.sender.send(Message::Text(payload.into())).is_ok() {
                    SendOutcome::Delivered
                } else {
                    // Channel closed underneath us: the receive loop has
                    // exited but unregister hasn't run yet.
                    active.remove(&event.user_id);
                    SendOutcome::Offline
                }
            }
            None => SendOutcome::Offline,
        }
    }

    /// Update the user's liveness timestamp. Does not alter delivery
    /// behavior.
    pub async fn heartbeat(&self, user_id: DbId) {
        if let Some(session) = self.active.write().await.get_mut(&user_id) {
            session.last_heartbeat = chrono::Utc::now();
        }
    }

    /// Last heartbeat time for a user's session, if one is registered.
    pub async fn last_heartbeat(&self, user_id: DbId) -> Option<Timestamp> {
        self.active.read().await.get(&user_id).map(|s| s.last_heartbeat)
    }

    /// Reconcile the registry against the transport-level connection set.
    ///
    /// Re-admits orphans (open connections whose user has no registry
    /// entry, e.g. after a send-time eviction raced a reconnect) and
    /// evicts stale entries (registry sessions whose channel has closed
    /// or whose connection is gone). Returns `(readmitted, evicted)`.
    pub async fn sweep(&self) -> (usize, usize) {
        let mut readmitted = 0;
        let mut evicted = 0;

        // Drop closed transport connections first.
        {
            let mut transport = self.transport.write().await;
            transport.retain(|_, conn| !conn.sender.is_closed());
        }

        let transport = self.transport.read().await;
        let mut active = self.active.write().await;

        // Stale cleanup: evict registry entries no longer backed by an
        // open connection.
        let stale: Vec<DbId> = active
            .iter()
            .filter(|(_, s)| s.sender.is_closed() || !transport.contains_key(&s.session_id))
            .map(|(user_id, _)| *user_id)
            .collect();
        for user_id in stale {
            active.remove(&user_id);
            evicted += 1;
        }

        // Orphan recovery: open connections whose user lost their entry.
        let now = chrono::Utc::now();
        for (session_id, conn) in transport.iter() {
            if !active.contains_key(&conn.user_id) {
                active.insert(
                    conn.user_id,
                    Session {
                        session_id: session_id.clone(),
                        sender: conn.sender.clone(),
                        connected_at: now,
                        last_heartbeat: now,
                        reconnects: 0,
                    },
                );
                readmitted += 1;
            }
        }

        if readmitted > 0 || evicted > 0 {
            tracing::info!(readmitted, evicted, "Session registry sweep");
        }
        (readmitted, evicted)
    }

    /// Send a Ping frame to every registered session.
    pub async fn ping_all(&self) {
        let active = self.active.read().await;
        for session in active.values() {
            let _ = session.sender.send(Message::Ping(axum::body::Bytes::new()));
        }
    }

    /// Current number of registered sessions (one per online user).
    pub async fn session_count(&self) -> usize {
        self.active.read().await.len()
    }

    /// Reconnect count for a user's current session.
    pub async fn reconnect_count(&self, user_id: DbId) -> Option<u32> {
        self.active.read().await.get(&user_id).map(|s| s.reconnects)
    }

    /// When the user's current session was established.
    pub async fn connected_at(&self, user_id: DbId) -> Option<Timestamp> {
        self.active.read().await.get(&user_id).map(|s| s.connected_at)
    }

    /// Send a Close frame to every session, then clear both maps.
    ///
    /// Used during graceful shutdown to notify all clients before the
    /// server stops accepting new connections.
    pub async fn shutdown_all(&self) {
        let mut active = self.active.write().await;
        let count = active.len();
        for session in active.values() {
            let _ = session.sender.send(Message::Close(None));
        }
        active.clear();
        self.transport.write().await.clear();
        tracing::info!(count, "Closed all notification sessions");
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

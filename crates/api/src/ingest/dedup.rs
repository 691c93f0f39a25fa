//! Time-windowed webhook dedup cache.
//!
//! The provider delivers callbacks at-least-once; this cache recognizes
//! repeat deliveries of the same logical event by a composite key of
//! (external job handle, reported status, variation id). Entries expire
//! individually after a TTL rather than being cleared wholesale, so a
//! legitimately reused key after the window is treated as new while
//! replays inside it are absorbed.
//!
//! Process-local and in-memory by design: across a restart the terminal
//! guard re-check against the database catches what the cache forgets.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use pixelforge_core::types::DbId;

/// Composite identity of one logical provider event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub external_job_id: String,
    pub status: &'static str,
    pub variation_id: DbId,
}

impl DedupKey {
    pub fn new(external_job_id: &str, status: &'static str, variation_id: DbId) -> Self {
        Self {
            external_job_id: external_job_id.to_string(),
            status,
            variation_id,
        }
    }
}

/// Bounded, per-entry-TTL dedup cache.
pub struct DedupCache {
    entries: Mutex<HashMap<DedupKey, Instant>>,
    ttl: Duration,
}

impl DedupCache {
    /// Create a cache whose entries expire `ttl` after first sight.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Record first sight of a key.
    ///
    /// Returns `true` if the key was absent (or expired) and is now
    /// recorded; `false` if it is a live duplicate.
    pub fn insert_if_absent(&self, key: &DedupKey) -> bool {
        let mut entries = self.entries.lock().expect("dedup cache lock poisoned");
        let now = Instant::now();
        match entries.get(key) {
            Some(seen) if now.duration_since(*seen) < self.ttl => false,
            _ => {
                entries.insert(key.clone(), now);
                true
            }
        }
    }

    /// Forget a key so the provider's automatic retry of a failed
    /// delivery can re-drive processing cleanly.
    pub fn remove(&self, key: &DedupKey) {
        self.entries
            .lock()
            .expect("dedup cache lock poisoned")
            .remove(key);
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.entries.lock().expect("dedup cache lock poisoned");
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, seen| now.duration_since(*seen) < self.ttl);
        before - entries.len()
    }

    /// Current number of live entries.
    pub fn len(&self) -> usize {
        self.entries.lock().expect("dedup cache lock poisoned").len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(n: i64) -> DedupKey {
        DedupKey::new("job-abc", "succeeded", n)
    }

    #[test]
    fn first_sight_is_recorded_second_is_duplicate() {
        let cache = DedupCache::new(Duration::from_secs(60));
        assert!(cache.insert_if_absent(&key(1)));
        assert!(!cache.insert_if_absent(&key(1)));
    }

    #[test]
    fn different_status_is_a_different_event() {
        let cache = DedupCache::new(Duration::from_secs(60));
        assert!(cache.insert_if_absent(&DedupKey::new("job-abc", "running", 1)));
        assert!(cache.insert_if_absent(&DedupKey::new("job-abc", "succeeded", 1)));
    }

    #[test]
    fn removed_key_can_be_reinserted() {
        let cache = DedupCache::new(Duration::from_secs(60));
        let k = key(1);
        assert!(cache.insert_if_absent(&k));
        cache.remove(&k);
        assert!(cache.insert_if_absent(&k));
    }

    #[test]
    fn expired_entry_is_treated_as_new() {
        let cache = DedupCache::new(Duration::ZERO);
        let k = key(1);
        assert!(cache.insert_if_absent(&k));
        // TTL of zero: already expired.
        assert!(cache.insert_if_absent(&k));
    }

    #[test]
    fn purge_drops_only_expired_entries() {
        let cache = DedupCache::new(Duration::ZERO);
        cache.insert_if_absent(&key(1));
        cache.insert_if_absent(&key(2));
        assert_eq!(cache.purge_expired(), 2);
        assert!(cache.is_empty());

        let long = DedupCache::new(Duration::from_secs(3600));
        long.insert_if_absent(&key(1));
        assert_eq!(long.purge_expired(), 0);
        assert_eq!(long.len(), 1);
    }
}

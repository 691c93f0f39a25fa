//! Unit tests for the webhook dedup cache, exercised the way the
//! ingestion path drives it: first sight proceeds, replays are absorbed,
//! failures forget the key so provider retries can re-drive.

use std::time::Duration;

use pixelforge_api::ingest::dedup::{DedupCache, DedupKey};

// ---------------------------------------------------------------------------
// Test: a burst of identical deliveries is absorbed to one
// ---------------------------------------------------------------------------

#[test]
fn replay_burst_processes_once() {
    let cache = DedupCache::new(Duration::from_secs(600));
    let key = DedupKey::new("job-9f2", "succeeded", 7);

    let mut processed = 0;
    for _ in 0..5 {
        if cache.insert_if_absent(&key) {
            processed += 1;
        }
    }

    assert_eq!(processed, 1);
}

// ---------------------------------------------------------------------------
// Test: distinct lifecycle events for one job are all processed
// ---------------------------------------------------------------------------

#[test]
fn distinct_statuses_are_not_duplicates() {
    let cache = DedupCache::new(Duration::from_secs(600));

    assert!(cache.insert_if_absent(&DedupKey::new("job-9f2", "queued", 7)));
    assert!(cache.insert_if_absent(&DedupKey::new("job-9f2", "running", 7)));
    assert!(cache.insert_if_absent(&DedupKey::new("job-9f2", "succeeded", 7)));
    assert_eq!(cache.len(), 3);
}

// ---------------------------------------------------------------------------
// Test: a failed processing attempt releases the key for retry
// ---------------------------------------------------------------------------

#[test]
fn failed_processing_releases_key_for_provider_retry() {
    let cache = DedupCache::new(Duration::from_secs(600));
    let key = DedupKey::new("job-9f2", "succeeded", 7);

    assert!(cache.insert_if_absent(&key));
    // Processing blew up; ingestion removes the key before returning 5xx.
    cache.remove(&key);

    // The provider's retry is treated as first sight again.
    assert!(cache.insert_if_absent(&key));
}

// ---------------------------------------------------------------------------
// Test: entries expire individually after the TTL
// ---------------------------------------------------------------------------

#[test]
fn entries_expire_per_entry_not_wholesale() {
    let cache = DedupCache::new(Duration::from_millis(20));
    let old = DedupKey::new("job-old", "succeeded", 1);

    assert!(cache.insert_if_absent(&old));
    std::thread::sleep(Duration::from_millis(30));

    let fresh = DedupKey::new("job-new", "succeeded", 2);
    assert!(cache.insert_if_absent(&fresh));

    // The old key has aged out and reads as new; the fresh one is still
    // live and dedups.
    assert!(cache.insert_if_absent(&old));
    assert!(!cache.insert_if_absent(&fresh));
}

//! Mirror Statistics Module
//!
//! Tracks read-through, bootstrap and event-processing counters. Counters are
//! atomics so readers, the scanner and the event loop never contend on a lock.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Mirror Stats ==
/// Live counters shared by every component of a mirror.
#[derive(Debug, Default)]
pub struct MirrorStats {
    hits: AtomicU64,
    misses: AtomicU64,
    remote_fetches: AtomicU64,
    not_found: AtomicU64,
    syncs: AtomicU64,
    keys_synced: AtomicU64,
    events_received: AtomicU64,
    events_applied: AtomicU64,
    events_ignored: AtomicU64,
    refresh_failures: AtomicU64,
    decode_errors: AtomicU64,
    reconnects: AtomicU64,
}

impl MirrorStats {
    // == Constructor ==
    /// Creates a new MirrorStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_remote_fetch(&self) {
        self.remote_fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_not_found(&self) {
        self.not_found.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a completed bootstrap scan and the number of keys it stored.
    pub fn record_sync(&self, stored: u64) {
        self.syncs.fetch_add(1, Ordering::Relaxed);
        self.keys_synced.fetch_add(stored, Ordering::Relaxed);
    }

    pub fn record_event_received(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_applied(&self) {
        self.events_applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_ignored(&self) {
        self.events_ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_refresh_failure(&self) {
        self.refresh_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    // == Snapshot ==
    /// Returns a point-in-time copy of every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            remote_fetches: self.remote_fetches.load(Ordering::Relaxed),
            not_found: self.not_found.load(Ordering::Relaxed),
            syncs: self.syncs.load(Ordering::Relaxed),
            keys_synced: self.keys_synced.load(Ordering::Relaxed),
            events_received: self.events_received.load(Ordering::Relaxed),
            events_applied: self.events_applied.load(Ordering::Relaxed),
            events_ignored: self.events_ignored.load(Ordering::Relaxed),
            refresh_failures: self.refresh_failures.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

// == Stats Snapshot ==
/// Serializable copy of [`MirrorStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Reads answered from the local store
    pub hits: u64,
    /// Reads that had to go to the backing store
    pub misses: u64,
    /// Single-key GETs issued (read-through and expire refreshes)
    pub remote_fetches: u64,
    /// Read-through lookups for keys absent upstream
    pub not_found: u64,
    /// Completed bootstrap scans
    pub syncs: u64,
    /// Entries written by bootstrap scans
    pub keys_synced: u64,
    pub events_received: u64,
    pub events_applied: u64,
    pub events_ignored: u64,
    /// Expire refreshes that failed and left a stale entry
    pub refresh_failures: u64,
    pub decode_errors: u64,
    /// Subscription connections re-established after an error
    pub reconnects: u64,
}

impl StatsSnapshot {
    // == Hit Rate ==
    /// Calculates the read-through hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no reads have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

//! Cache Statistics Module
//!
//! Process-local hit/miss counters. Never persisted, reset on restart.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Cache Stats ==
/// Lock-free hit/miss counters shared by every caller of a store.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Record Hit ==
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    // == Record Miss ==
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    // == Snapshot ==
    /// Captures the counters together with the store-level facts callers report.
    pub fn snapshot(&self, key_count: usize, backend_connected: bool) -> StatsSnapshot {
        StatsSnapshot::new(self.hits(), self.misses(), key_count, backend_connected)
    }
}

// == Stats Snapshot ==
/// Point-in-time view of cache statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    /// Number of successful cache retrievals
    pub hits: u64,
    /// Number of failed cache retrievals (key absent or expired)
    pub misses: u64,
    /// hits / (hits + misses), or 0.0 before any request
    pub hit_rate: f64,
    /// Number of keys currently held by the active store
    pub key_count: usize,
    /// Whether the last shared backend call succeeded
    pub backend_connected: bool,
}

impl StatsSnapshot {
    pub fn new(hits: u64, misses: u64, key_count: usize, backend_connected: bool) -> Self {
        let total = hits + misses;
        let hit_rate = if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        };
        Self {
            hits,
            misses,
            hit_rate,
            key_count,
            backend_connected,
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let stats = CacheStats::new();
        assert_eq!(stats.hits(), 0);
        assert_eq!(stats.misses(), 0);
    }

    #[test]
    fn test_hit_rate_no_requests() {
        let snapshot = CacheStats::new().snapshot(0, false);
        assert_eq!(snapshot.hit_rate, 0.0);
    }

    #[test]
    fn test_hit_rate_all_hits() {
        let stats = CacheStats::new();
        stats.record_hit();
        stats.record_hit();
        stats.record_hit();
        assert_eq!(stats.snapshot(3, true).hit_rate, 1.0);
    }

    #[test]
    fn test_hit_rate_mixed() {
        let stats = CacheStats::new();
        stats.record_hit();
        stats.record_miss();
        let snapshot = stats.snapshot(1, true);
        assert_eq!(snapshot.hit_rate, 0.5);
        assert_eq!(snapshot.key_count, 1);
        assert!(snapshot.backend_connected);
    }

    #[test]
    fn test_snapshot_serializes_all_fields() {
        let json = serde_json::to_value(StatsSnapshot::new(8, 2, 4, false)).unwrap();
        assert_eq!(json["hits"], 8);
        assert_eq!(json["misses"], 2);
        assert_eq!(json["key_count"], 4);
        assert_eq!(json["backend_connected"], false);
        assert!((json["hit_rate"].as_f64().unwrap() - 0.8).abs() < 0.001);
    }
}

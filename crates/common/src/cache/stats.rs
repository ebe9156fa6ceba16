//! Cache statistics and metrics tracking

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Statistics snapshot for cache monitoring
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Current number of entries
    pub size: usize,

    /// Estimated bytes held by serialized values
    pub estimated_bytes: u64,

    /// Total number of successful get operations
    pub hits: u64,

    /// Total number of failed get operations (absent or expired)
    pub misses: u64,

    /// Total number of set operations that succeeded
    pub inserts: u64,

    /// Total number of expired entries removed
    pub expirations: u64,

    /// Total number of set operations abandoned to contention
    pub contention_failures: u64,
}

impl CacheStats {
    /// Calculate hit rate (hits / total accesses)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Total number of access operations (hits + misses)
    pub fn total_accesses(&self) -> u64 {
        self.hits + self.misses
    }
}

/// Thread-safe metrics collector for cache operations
///
/// Atomic counters so tracking never takes the storage lock.
#[derive(Debug, Default)]
pub(crate) struct MetricsCollector {
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
    inserts: Arc<AtomicU64>,
    expirations: Arc<AtomicU64>,
    contention_failures: Arc<AtomicU64>,
}

impl Clone for MetricsCollector {
    fn clone(&self) -> Self {
        Self {
            hits: Arc::clone(&self.hits),
            misses: Arc::clone(&self.misses),
            inserts: Arc::clone(&self.inserts),
            expirations: Arc::clone(&self.expirations),
            contention_failures: Arc::clone(&self.contention_failures),
        }
    }
}

impl MetricsCollector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_insert(&self) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_expiration(&self) {
        self.expirations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_contention_failure(&self) {
        self.contention_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current statistics snapshot
    pub(crate) fn snapshot(&self, size: usize, estimated_bytes: u64) -> CacheStats {
        CacheStats {
            size,
            estimated_bytes,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            contention_failures: self.contention_failures.load(Ordering::Relaxed),
        }
    }

    /// Reset all metrics to zero
    pub(crate) fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.inserts.store(0, Ordering::Relaxed);
        self.expirations.store(0, Ordering::Relaxed);
        self.contention_failures.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for cache::stats.
    use super::*;

    /// Validates `CacheStats::default` behavior for the default stats
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms `stats.size` equals `0`.
    /// - Confirms `stats.hits` equals `0`.
    /// - Confirms `stats.hit_rate()` equals `0.0`.
    #[test]
    fn test_stats_default() {
        let stats = CacheStats::default();
        assert_eq!(stats.size, 0);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.hit_rate(), 0.0);
    }

    /// Validates `MetricsCollector::new` behavior for the hit rate scenario.
    ///
    /// Assertions:
    /// - Confirms `stats.hits` equals `3`.
    /// - Confirms `stats.misses` equals `1`.
    /// - Confirms `stats.hit_rate()` equals `0.75`.
    #[test]
    fn test_hit_rate() {
        let collector = MetricsCollector::new();
        collector.record_hit();
        collector.record_hit();
        collector.record_hit();
        collector.record_miss();

        let stats = collector.snapshot(2, 128);
        assert_eq!(stats.hits, 3);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate(), 0.75);
        assert_eq!(stats.total_accesses(), 4);
    }

    /// Validates `MetricsCollector::reset` behavior for the reset scenario.
    ///
    /// Assertions:
    /// - Confirms all counters return to `0` after reset.
    #[test]
    fn test_reset() {
        let collector = MetricsCollector::new();
        collector.record_insert();
        collector.record_expiration();
        collector.record_contention_failure();

        collector.reset();
        let stats = collector.snapshot(0, 0);
        assert_eq!(stats.inserts, 0);
        assert_eq!(stats.expirations, 0);
        assert_eq!(stats.contention_failures, 0);
    }
}

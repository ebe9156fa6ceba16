//! Core cache implementation
//!
//! Thread-safe key/value store over `RwLock<HashMap>` with per-entry TTL,
//! SHA-256 integrity hashing of serialized values, lazy expiry at read
//! time, and a contention-bounded write path. `clear` takes the storage
//! lock exclusively so it can never interleave with a `set`.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, TryLockError};
use std::time::{Duration, Instant};

use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

use super::config::CacheConfig;
use super::stats::{CacheStats, MetricsCollector};
use crate::time::{Clock, SystemClock};

/// Error type for cache write operations
///
/// Cache failures are non-fatal by contract: callers proceed without
/// caching when a `set` fails.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The value could not be serialized for hashing/storage
    #[error("failed to serialize value for key '{key}': {reason}")]
    Serialization { key: String, reason: String },

    /// Lock contention persisted through the retry budget
    #[error("cache lock contended after {attempts} attempts")]
    Contention { attempts: u32 },

    /// A writer panicked while holding the lock
    #[error("cache lock poisoned")]
    Poisoned,
}

/// Entry stored in the cache
///
/// Owned exclusively by the cache; readers receive clones of the value,
/// never a reference into the store.
#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    created_at: Instant,
    expires_at: Instant,
    integrity_hash: String,
    size_bytes: usize,
}

/// Metadata snapshot of a live entry, for diagnostics and tests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    /// Hex-encoded SHA-256 of the serialized value
    pub integrity_hash: String,

    /// Size of the serialized value in bytes
    pub size_bytes: usize,

    /// Time since the entry was written
    pub age: Duration,

    /// Time remaining until expiry
    pub expires_in: Duration,
}

#[derive(Debug, Default)]
struct CacheStorage {
    entries: HashMap<String, CacheEntry>,
    total_bytes: u64,
}

impl CacheStorage {
    fn remove_entry(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.total_bytes = self.total_bytes.saturating_sub(entry.size_bytes as u64);
        Some(entry)
    }
}

/// Thread-safe expiring cache for serialized payloads
///
/// # Type Parameters
/// - `C`: Clock type for time-based operations (defaults to `SystemClock`)
///
/// Clones share the same storage, so one instance can be handed to every
/// component that needs it.
pub struct Cache<C = SystemClock>
where
    C: Clock,
{
    storage: Arc<RwLock<CacheStorage>>,
    config: CacheConfig,
    metrics: MetricsCollector,
    clock: C,
}

impl Cache<SystemClock> {
    /// Create a new cache with the given configuration using system clock
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<C> Cache<C>
where
    C: Clock + Clone,
{
    /// Create a new cache with a custom clock (useful for testing)
    pub fn with_clock(config: CacheConfig, clock: C) -> Self {
        Self {
            storage: Arc::new(RwLock::new(CacheStorage::default())),
            config,
            metrics: MetricsCollector::new(),
            clock,
        }
    }

    /// Get a value from the cache
    ///
    /// Expiry is re-checked against the clock at read time; an expired
    /// entry is removed atomically and reported as absent, even if a sweep
    /// has not run yet.
    pub fn get(&self, key: &str) -> Option<Value> {
        let mut storage = match self.storage.write() {
            Ok(guard) => guard,
            Err(_) => {
                warn!(key = %key, "cache lock poisoned during get");
                return None;
            }
        };

        let now = self.clock.now();
        let expired = match storage.entries.get(key) {
            Some(entry) => entry.expires_at <= now,
            None => {
                if self.config.track_metrics {
                    self.metrics.record_miss();
                }
                return None;
            }
        };

        if expired {
            storage.remove_entry(key);
            if self.config.track_metrics {
                self.metrics.record_expiration();
                self.metrics.record_miss();
            }
            return None;
        }

        let value = storage.entries.get(key).map(|entry| entry.value.clone());
        if self.config.track_metrics {
            self.metrics.record_hit();
        }
        value
    }

    /// Get a value and verify its integrity hash
    ///
    /// For critical reads (the token entry). Recomputes the SHA-256 of the
    /// stored value and compares it to the hash recorded at write time; a
    /// mismatch removes the entry and reports it as absent.
    pub fn get_verified(&self, key: &str) -> Option<Value> {
        let value = self.get(key)?;

        let serialized = serde_json::to_string(&value).ok()?;
        let expected = self.entry_info(key)?.integrity_hash;
        if integrity_hash(&serialized) != expected {
            warn!(key = %key, "cache integrity check failed, dropping entry");
            self.remove(key);
            return None;
        }

        Some(value)
    }

    /// Insert or replace a value with the given TTL
    ///
    /// Racing writers for the same key resolve last-writer-wins. Lock
    /// contention is retried up to the configured budget with a short
    /// pause; exhausting it reports failure and the caller proceeds
    /// without caching.
    ///
    /// # Errors
    /// Returns `CacheError::Serialization` when the value cannot be
    /// serialized, `CacheError::Contention` when the lock stayed busy.
    pub fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<(), CacheError> {
        let serialized = serde_json::to_string(&value).map_err(|e| {
            CacheError::Serialization { key: key.to_string(), reason: e.to_string() }
        })?;
        let hash = integrity_hash(&serialized);
        let size_bytes = serialized.len();
        let ttl = ttl.unwrap_or(self.config.default_ttl);

        let attempts = self.config.set_retries.max(1);
        for attempt in 1..=attempts {
            match self.storage.try_write() {
                Ok(mut storage) => {
                    let now = self.clock.now();
                    storage.remove_entry(key);
                    storage.entries.insert(
                        key.to_string(),
                        CacheEntry {
                            value,
                            created_at: now,
                            expires_at: now + ttl,
                            integrity_hash: hash,
                            size_bytes,
                        },
                    );
                    storage.total_bytes += size_bytes as u64;

                    if self.config.track_metrics {
                        self.metrics.record_insert();
                    }

                    if let Some(threshold) = self.config.memory_threshold_bytes {
                        if storage.total_bytes > threshold {
                            let swept = self.sweep_locked(&mut storage);
                            debug!(swept, "memory threshold exceeded, swept expired entries");
                        }
                    }

                    return Ok(());
                }
                Err(TryLockError::WouldBlock) if attempt < attempts => {
                    std::thread::sleep(self.config.set_retry_delay);
                }
                Err(TryLockError::WouldBlock) => {
                    if self.config.track_metrics {
                        self.metrics.record_contention_failure();
                    }
                    return Err(CacheError::Contention { attempts });
                }
                Err(TryLockError::Poisoned(_)) => return Err(CacheError::Poisoned),
            }
        }

        Err(CacheError::Contention { attempts })
    }

    /// Remove a single entry, returning its value if present
    pub fn remove(&self, key: &str) -> Option<Value> {
        let mut storage = self.storage.write().ok()?;
        storage.remove_entry(key).map(|entry| entry.value)
    }

    /// Clear all entries
    ///
    /// Holds the storage lock exclusively for the duration, so a clear can
    /// never interleave with a `set`. A non-forced clear refuses instead of
    /// waiting when the lock is busy.
    ///
    /// # Errors
    /// Returns `CacheError::Contention` for a non-forced clear under
    /// contention.
    pub fn clear(&self, force: bool) -> Result<(), CacheError> {
        let mut storage = if force {
            match self.storage.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            }
        } else {
            match self.storage.try_write() {
                Ok(guard) => guard,
                Err(TryLockError::WouldBlock) => {
                    return Err(CacheError::Contention { attempts: 1 });
                }
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            }
        };

        storage.entries.clear();
        storage.total_bytes = 0;
        if self.config.track_metrics {
            self.metrics.reset();
        }
        debug!("cache cleared");
        Ok(())
    }

    /// Remove expired entries, returning how many were removed
    ///
    /// Correctness never depends on this: `get` performs its own expiry
    /// check. This exists so memory can be reclaimed proactively.
    pub fn sweep_expired(&self) -> usize {
        match self.storage.write() {
            Ok(mut storage) => self.sweep_locked(&mut storage),
            Err(_) => 0,
        }
    }

    /// Metadata for a live entry (expired entries report as absent)
    pub fn entry_info(&self, key: &str) -> Option<EntryInfo> {
        let storage = self.storage.read().ok()?;
        let entry = storage.entries.get(key)?;
        let now = self.clock.now();
        if entry.expires_at <= now {
            return None;
        }
        Some(EntryInfo {
            integrity_hash: entry.integrity_hash.clone(),
            size_bytes: entry.size_bytes,
            age: now.saturating_duration_since(entry.created_at),
            expires_in: entry.expires_at - now,
        })
    }

    /// Get the current number of entries
    pub fn len(&self) -> usize {
        self.storage.read().map(|s| s.entries.len()).unwrap_or(0)
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let (size, bytes) = self
            .storage
            .read()
            .map(|s| (s.entries.len(), s.total_bytes))
            .unwrap_or((0, 0));
        self.metrics.snapshot(size, bytes)
    }

    fn sweep_locked(&self, storage: &mut CacheStorage) -> usize {
        let now = self.clock.now();
        let expired: Vec<String> = storage
            .entries
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(k, _)| k.clone())
            .collect();

        for key in &expired {
            storage.remove_entry(key);
            if self.config.track_metrics {
                self.metrics.record_expiration();
            }
        }

        expired.len()
    }
}

impl<C> Clone for Cache<C>
where
    C: Clock + Clone,
{
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            config: self.config.clone(),
            metrics: self.metrics.clone(),
            clock: self.clock.clone(),
        }
    }
}

/// Hex-encoded SHA-256 over a serialized value
fn integrity_hash(serialized: &str) -> String {
    hex::encode(Sha256::digest(serialized.as_bytes()))
}

#[cfg(test)]
mod tests {
    //! Unit tests for cache::core.
    use std::thread;

    use serde_json::json;

    use super::*;
    use crate::time::MockClock;

    fn test_cache() -> Cache<MockClock> {
        let clock = MockClock::new();
        Cache::with_clock(CacheConfig::default(), clock)
    }

    /// Validates `Cache::new` behavior for the new cache scenario.
    ///
    /// Assertions:
    /// - Confirms `cache.len()` equals `0`.
    /// - Ensures `cache.is_empty()` evaluates to true.
    #[test]
    fn test_cache_new() {
        let cache = Cache::new(CacheConfig::default());
        assert_eq!(cache.len(), 0);
        assert!(cache.is_empty());
    }

    /// Validates `Cache::set` behavior for the set and get scenario.
    ///
    /// Assertions:
    /// - Confirms `cache.get("a")` equals `Some(json!(1))`.
    /// - Confirms `cache.get("b")` equals `Some(json!({"id": "a1"}))`.
    /// - Confirms `cache.get("missing")` equals `None`.
    #[test]
    fn test_cache_set_and_get() {
        let cache = test_cache();

        cache.set("a", json!(1), None).unwrap();
        cache.set("b", json!({"id": "a1"}), None).unwrap();

        assert_eq!(cache.get("a"), Some(json!(1)));
        assert_eq!(cache.get("b"), Some(json!({"id": "a1"})));
        assert_eq!(cache.get("missing"), None);
        assert_eq!(cache.len(), 2);
    }

    /// Validates `Cache::get` behavior for the idempotent read scenario.
    ///
    /// Assertions:
    /// - Confirms repeated gets return the same value.
    /// - Confirms `cache.len()` stays `1`.
    #[test]
    fn test_cache_get_is_idempotent() {
        let cache = test_cache();
        cache.set("k", json!("v"), None).unwrap();

        assert_eq!(cache.get("k"), Some(json!("v")));
        assert_eq!(cache.get("k"), Some(json!("v")));
        assert_eq!(cache.get("k"), Some(json!("v")));
        assert_eq!(cache.len(), 1);
    }

    /// Validates `Cache::set` behavior for the replace scenario.
    ///
    /// Assertions:
    /// - Confirms the second write wins.
    /// - Confirms `cache.len()` equals `1`.
    #[test]
    fn test_cache_replace_last_writer_wins() {
        let cache = test_cache();

        cache.set("k", json!(1), None).unwrap();
        cache.set("k", json!(2), None).unwrap();

        assert_eq!(cache.get("k"), Some(json!(2)));
        assert_eq!(cache.len(), 1);
    }

    /// Validates `MockClock::advance` behavior for the ttl expiry scenario.
    ///
    /// Assertions:
    /// - Confirms `cache.get("k")` equals `Some(...)` before expiry.
    /// - Confirms `cache.get("k")` equals `None` after ttl elapses.
    /// - Confirms `cache.len()` equals `0` after the expired read.
    #[test]
    fn test_cache_ttl_expiration() {
        let clock = MockClock::new();
        let cache = Cache::with_clock(CacheConfig::default(), clock.clone());

        cache.set("k", json!("v"), Some(Duration::from_secs(1))).unwrap();
        assert_eq!(cache.get("k"), Some(json!("v")));

        clock.advance(Duration::from_millis(1100));

        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.len(), 0);
    }

    /// Validates `MockClock::advance` behavior for the ttl not expired
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms `cache.get("k")` equals `Some(json!("v"))`.
    #[test]
    fn test_cache_ttl_not_expired() {
        let clock = MockClock::new();
        let cache = Cache::with_clock(CacheConfig::default(), clock.clone());

        cache.set("k", json!("v"), Some(Duration::from_secs(10))).unwrap();
        clock.advance(Duration::from_secs(5));

        assert_eq!(cache.get("k"), Some(json!("v")));
    }

    /// Validates `Cache::entry_info` behavior for the integrity hash
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms the stored hash matches a recomputed SHA-256 of the
    ///   serialized value.
    /// - Confirms `cache.get_verified("k")` equals the original value.
    #[test]
    fn test_cache_integrity_roundtrip() {
        let cache = test_cache();
        let value = json!({"id": "a1", "severity": "high"});

        cache.set("k", value.clone(), None).unwrap();

        let info = cache.entry_info("k").unwrap();
        let recomputed = integrity_hash(&serde_json::to_string(&value).unwrap());
        assert_eq!(info.integrity_hash, recomputed);
        assert_eq!(info.size_bytes, serde_json::to_string(&value).unwrap().len());

        assert_eq!(cache.get_verified("k"), Some(value));
    }

    /// Validates `Cache::clear` behavior for the clear scenario.
    ///
    /// Assertions:
    /// - Confirms `cache.len()` equals `0` after clear.
    /// - Confirms `cache.stats().estimated_bytes` equals `0` after clear.
    #[test]
    fn test_cache_clear() {
        let cache = test_cache();
        cache.set("a", json!(1), None).unwrap();
        cache.set("b", json!(2), None).unwrap();
        assert_eq!(cache.len(), 2);

        cache.clear(false).unwrap();
        assert_eq!(cache.len(), 0);
        assert!(cache.is_empty());
        assert_eq!(cache.stats().estimated_bytes, 0);
    }

    /// Validates `Cache::remove` behavior for the remove scenario.
    ///
    /// Assertions:
    /// - Confirms `removed` equals `Some(json!(1))`.
    /// - Confirms `cache.get("a")` equals `None` afterwards.
    #[test]
    fn test_cache_remove() {
        let cache = test_cache();
        cache.set("a", json!(1), None).unwrap();

        let removed = cache.remove("a");
        assert_eq!(removed, Some(json!(1)));
        assert_eq!(cache.get("a"), None);
    }

    /// Validates `Cache::sweep_expired` behavior for the sweep scenario.
    ///
    /// Assertions:
    /// - Confirms `swept` equals `2`.
    /// - Confirms `cache.len()` equals `1`.
    #[test]
    fn test_cache_sweep_expired() {
        let clock = MockClock::new();
        let cache = Cache::with_clock(CacheConfig::default(), clock.clone());

        cache.set("a", json!(1), Some(Duration::from_secs(1))).unwrap();
        cache.set("b", json!(2), Some(Duration::from_secs(1))).unwrap();
        cache.set("c", json!(3), Some(Duration::from_secs(60))).unwrap();

        clock.advance(Duration::from_secs(2));

        let swept = cache.sweep_expired();
        assert_eq!(swept, 2);
        assert_eq!(cache.len(), 1);
    }

    /// Validates `CacheConfig::builder` behavior for the memory threshold
    /// sweep scenario.
    ///
    /// Assertions:
    /// - Confirms expired entries are swept once the byte threshold is
    ///   crossed by a later insert.
    #[test]
    fn test_cache_memory_threshold_triggers_sweep() {
        let clock = MockClock::new();
        let config = CacheConfig::builder().memory_threshold_bytes(8).build();
        let cache = Cache::with_clock(config, clock.clone());

        cache.set("old", json!("aaaaaaaa"), Some(Duration::from_secs(1))).unwrap();
        clock.advance(Duration::from_secs(2));

        // This insert pushes estimated bytes past the threshold; the sweep
        // removes the expired entry.
        cache.set("new", json!("bbbbbbbb"), Some(Duration::from_secs(60))).unwrap();

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("new"), Some(json!("bbbbbbbb")));
    }

    /// Validates `Cache::stats` behavior for the stats tracking scenario.
    ///
    /// Assertions:
    /// - Confirms `stats.hits` equals `2`.
    /// - Confirms `stats.misses` equals `1`.
    /// - Confirms `stats.inserts` equals `2`.
    #[test]
    fn test_cache_stats_tracking() {
        let cache = test_cache();

        cache.set("a", json!(1), None).unwrap();
        cache.set("b", json!(2), None).unwrap();

        let _ = cache.get("a");
        let _ = cache.get("a");
        let _ = cache.get("missing");

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.inserts, 2);
        assert_eq!(stats.size, 2);
    }

    /// Validates `Arc::new` behavior for the concurrent writers scenario.
    ///
    /// Assertions:
    /// - Confirms `cache.len()` equals `100` after 10 threads insert 10 keys
    ///   each.
    #[test]
    fn test_cache_thread_safety() {
        let config = CacheConfig::builder().set_retries(100).build();
        let cache = Arc::new(Cache::new(config));
        let mut handles = vec![];

        for i in 0..10 {
            let cache_clone = Arc::clone(&cache);
            let handle = thread::spawn(move || {
                for j in 0..10 {
                    let key = format!("key-{}-{}", i, j);
                    cache_clone.set(&key, json!(i * 10 + j), None).unwrap();
                }
            });
            handles.push(handle);
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cache.len(), 100);
    }

    /// Validates `Cache::clone` behavior for the shared storage scenario.
    ///
    /// Assertions:
    /// - Confirms `cache2.get("k")` equals `Some(json!(1))`.
    /// - Confirms `cache1.get("k2")` equals `Some(json!(2))`.
    #[test]
    fn test_cache_clone_shares_storage() {
        let cache1 = test_cache();
        cache1.set("k", json!(1), None).unwrap();

        let cache2 = cache1.clone();
        assert_eq!(cache2.get("k"), Some(json!(1)));

        cache2.set("k2", json!(2), None).unwrap();
        assert_eq!(cache1.get("k2"), Some(json!(2)));
    }
}

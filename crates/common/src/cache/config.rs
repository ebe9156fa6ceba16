//! Cache configuration types and builder

use std::time::Duration;

/// Default TTL applied when `set` is called without one (5 minutes)
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Default number of times `set` retries lock contention
pub const DEFAULT_SET_RETRIES: u32 = 3;

/// Default pause between `set` contention retries
pub const DEFAULT_SET_RETRY_DELAY: Duration = Duration::from_millis(5);

/// Configuration for cache behavior
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// TTL applied when a `set` does not specify one
    pub default_ttl: Duration,

    /// Estimated-bytes threshold that triggers an expired-entry sweep
    /// (None = never sweep proactively)
    pub memory_threshold_bytes: Option<u64>,

    /// Number of times `set` retries transient lock contention
    pub set_retries: u32,

    /// Pause between `set` contention retries
    pub set_retry_delay: Duration,

    /// Whether to collect access metrics
    pub track_metrics: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: DEFAULT_TTL,
            memory_threshold_bytes: Some(64 * 1024 * 1024),
            set_retries: DEFAULT_SET_RETRIES,
            set_retry_delay: DEFAULT_SET_RETRY_DELAY,
            track_metrics: true,
        }
    }
}

impl CacheConfig {
    /// Create a new configuration builder
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Quick preset for a TTL-only cache
    ///
    /// # Example
    /// ```
    /// use std::time::Duration;
    ///
    /// use aegis_common::cache::CacheConfig;
    ///
    /// let config = CacheConfig::ttl(Duration::from_secs(3600));
    /// ```
    pub fn ttl(duration: Duration) -> Self {
        Self { default_ttl: duration, ..Self::default() }
    }
}

/// Builder for [`CacheConfig`] with fluent API
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    config: CacheConfig,
}

impl CacheConfigBuilder {
    /// Set the default TTL for entries
    pub fn default_ttl(mut self, duration: Duration) -> Self {
        self.config.default_ttl = duration;
        self
    }

    /// Set the memory-pressure sweep threshold in bytes
    pub fn memory_threshold_bytes(mut self, bytes: u64) -> Self {
        self.config.memory_threshold_bytes = Some(bytes);
        self
    }

    /// Disable the memory-pressure sweep
    pub fn no_memory_threshold(mut self) -> Self {
        self.config.memory_threshold_bytes = None;
        self
    }

    /// Set the number of contention retries for `set`
    pub fn set_retries(mut self, retries: u32) -> Self {
        self.config.set_retries = retries;
        self
    }

    /// Set the pause between contention retries
    pub fn set_retry_delay(mut self, delay: Duration) -> Self {
        self.config.set_retry_delay = delay;
        self
    }

    /// Enable or disable metrics collection
    pub fn track_metrics(mut self, enabled: bool) -> Self {
        self.config.track_metrics = enabled;
        self
    }

    /// Build the final configuration
    pub fn build(self) -> CacheConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for cache::config.
    use super::*;

    /// Validates `CacheConfig::default` behavior for the default config
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms `config.default_ttl` equals `DEFAULT_TTL`.
    /// - Confirms `config.set_retries` equals `3`.
    /// - Ensures `config.track_metrics` evaluates to true.
    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.default_ttl, DEFAULT_TTL);
        assert_eq!(config.set_retries, 3);
        assert!(config.track_metrics);
    }

    /// Validates `CacheConfig::builder` behavior for the builder scenario.
    ///
    /// Assertions:
    /// - Confirms `config.default_ttl` equals `Duration::from_secs(60)`.
    /// - Confirms `config.memory_threshold_bytes` equals `Some(1024)`.
    /// - Confirms `config.set_retries` equals `5`.
    #[test]
    fn test_builder() {
        let config = CacheConfig::builder()
            .default_ttl(Duration::from_secs(60))
            .memory_threshold_bytes(1024)
            .set_retries(5)
            .build();

        assert_eq!(config.default_ttl, Duration::from_secs(60));
        assert_eq!(config.memory_threshold_bytes, Some(1024));
        assert_eq!(config.set_retries, 5);
    }

    /// Validates `CacheConfig::ttl` behavior for the ttl preset scenario.
    ///
    /// Assertions:
    /// - Confirms `config.default_ttl` equals `Duration::from_secs(3600)`.
    #[test]
    fn test_ttl_preset() {
        let config = CacheConfig::ttl(Duration::from_secs(3600));
        assert_eq!(config.default_ttl, Duration::from_secs(3600));
    }
}

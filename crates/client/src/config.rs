//! Client configuration
//!
//! Configuration is resolved once at client construction and handed by
//! reference to every pipeline component. Values come from the builder or
//! from `AEGIS_*` environment variables, with defaults matching the
//! platform's published limits.
//!
//! ## Environment Variables
//! - `AEGIS_BASE_URL`: API origin (e.g. `https://api.aegis-platform.io`)
//! - `AEGIS_API_VERSION`: versioned path segment (default `v1`)
//! - `AEGIS_REQUEST_TIMEOUT_SECS`: per-request timeout (default 30)
//! - `AEGIS_RETRY_COUNT`: retry budget after the initial attempt (default 3)
//! - `AEGIS_RETRY_INTERVAL_SECS`: base backoff interval (default 2)
//! - `AEGIS_TOKEN_TTL_SECS`: minted token lifetime (default 3600)
//! - `AEGIS_ISSUER` / `AEGIS_AUDIENCE`: expected token claims

use std::time::Duration;

use aegis_common::retry::RetryPolicy;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Default API origin
pub const DEFAULT_BASE_URL: &str = "https://api.aegis-platform.io";

/// Default versioned path segment
pub const DEFAULT_API_VERSION: &str = "v1";

/// Safety margin subtracted from token lifetime when caching (5 minutes)
pub const DEFAULT_TOKEN_SAFETY_MARGIN: Duration = Duration::from_secs(300);

/// Configuration error raised at client construction
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("insecure scheme '{scheme}' (https required)")]
    InsecureScheme { scheme: String },
}

/// Configuration for the API client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API origin, scheme + host (no trailing path)
    pub base_url: String,

    /// Versioned path segment (`api/{version}/...`)
    pub api_version: String,

    /// User agent presented on every request
    pub user_agent: String,

    /// Timeout applied to each request attempt
    pub request_timeout: Duration,

    /// Retry budget after the initial attempt
    pub retry_count: u32,

    /// Base interval the backoff formulas scale from
    pub retry_interval: Duration,

    /// Lifetime of freshly minted tokens
    pub token_ttl: Duration,

    /// Margin subtracted from the token lifetime when caching it
    pub token_safety_margin: Duration,

    /// Expected `iss` claim
    pub issuer: String,

    /// Expected `aud` claim
    pub audience: String,

    /// TTL for cached API responses
    pub response_cache_ttl: Duration,

    /// Permit plain-HTTP origins (mock servers in tests)
    pub allow_http: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            user_agent: format!("aegis-client/{}", env!("CARGO_PKG_VERSION")),
            request_timeout: Duration::from_secs(30),
            retry_count: 3,
            retry_interval: Duration::from_secs(2),
            token_ttl: Duration::from_secs(3600),
            token_safety_margin: DEFAULT_TOKEN_SAFETY_MARGIN,
            issuer: "aegis-client".to_string(),
            audience: "aegis-api".to_string(),
            response_cache_ttl: Duration::from_secs(300),
            allow_http: false,
        }
    }
}

impl ClientConfig {
    /// Create a builder over the defaults
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Load configuration from `AEGIS_*` environment variables
    ///
    /// Unset or unparseable variables fall back to their defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let config = Self {
            base_url: env_string("AEGIS_BASE_URL", defaults.base_url),
            api_version: env_string("AEGIS_API_VERSION", defaults.api_version),
            request_timeout: env_secs("AEGIS_REQUEST_TIMEOUT_SECS", defaults.request_timeout),
            retry_count: env_parse("AEGIS_RETRY_COUNT", defaults.retry_count),
            retry_interval: env_secs("AEGIS_RETRY_INTERVAL_SECS", defaults.retry_interval),
            token_ttl: env_secs("AEGIS_TOKEN_TTL_SECS", defaults.token_ttl),
            issuer: env_string("AEGIS_ISSUER", defaults.issuer),
            audience: env_string("AEGIS_AUDIENCE", defaults.audience),
            ..defaults
        };
        debug!(
            base_url = %config.base_url,
            api_version = %config.api_version,
            retry_count = config.retry_count,
            "client configuration loaded"
        );
        config
    }

    /// Validate the configuration
    ///
    /// # Errors
    /// Returns `ConfigError` when the base URL does not parse or uses a
    /// plain-HTTP scheme without `allow_http`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.base_url).map_err(|e| ConfigError::InvalidBaseUrl {
            url: self.base_url.clone(),
            reason: e.to_string(),
        })?;

        if url.scheme() != "https" && !self.allow_http {
            return Err(ConfigError::InsecureScheme { scheme: url.scheme().to_string() });
        }

        Ok(())
    }

    /// Versioned API base, `{base_url}/api/{version}`
    pub fn api_base(&self) -> String {
        format!("{}/api/{}", self.base_url.trim_end_matches('/'), self.api_version)
    }

    /// The retry policy this configuration implies
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_count, self.retry_interval)
    }

    /// Cache TTL for a freshly minted token (lifetime minus safety margin)
    pub fn token_cache_ttl(&self) -> Duration {
        self.token_ttl.saturating_sub(self.token_safety_margin)
    }
}

fn env_string(name: &str, default: String) -> String {
    std::env::var(name).ok().filter(|v| !v.is_empty()).unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_secs(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

/// Builder for [`ClientConfig`]
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Set the API origin
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    /// Set the API version segment
    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        self.config.api_version = version.into();
        self
    }

    /// Set the per-attempt request timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Set the retry budget
    pub fn retry_count(mut self, count: u32) -> Self {
        self.config.retry_count = count;
        self
    }

    /// Set the base backoff interval
    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.config.retry_interval = interval;
        self
    }

    /// Set the minted token lifetime
    pub fn token_ttl(mut self, ttl: Duration) -> Self {
        self.config.token_ttl = ttl;
        self
    }

    /// Set the expected issuer claim
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.config.issuer = issuer.into();
        self
    }

    /// Set the expected audience claim
    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.config.audience = audience.into();
        self
    }

    /// Set the cached-response TTL
    pub fn response_cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.response_cache_ttl = ttl;
        self
    }

    /// Permit plain-HTTP origins (mock servers in tests)
    pub fn allow_http(mut self, allow: bool) -> Self {
        self.config.allow_http = allow;
        self
    }

    /// Build the final configuration
    pub fn build(self) -> ClientConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.api_version, "v1");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.retry_count, 3);
        assert_eq!(config.retry_interval, Duration::from_secs(2));
        assert!(!config.allow_http);
    }

    #[test]
    fn test_api_base_joins_version() {
        let config = ClientConfig::builder().base_url("https://api.example.com/").build();
        assert_eq!(config.api_base(), "https://api.example.com/api/v1");
    }

    #[test]
    fn test_validate_rejects_http_by_default() {
        let config = ClientConfig::builder().base_url("http://api.example.com").build();
        assert!(matches!(config.validate(), Err(ConfigError::InsecureScheme { .. })));

        let relaxed = ClientConfig::builder()
            .base_url("http://api.example.com")
            .allow_http(true)
            .build();
        assert!(relaxed.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_malformed_url() {
        let config = ClientConfig::builder().base_url("not a url").build();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidBaseUrl { .. })));
    }

    #[test]
    fn test_token_cache_ttl_applies_safety_margin() {
        let config = ClientConfig::default();
        assert_eq!(config.token_cache_ttl(), Duration::from_secs(3600 - 300));
    }

    #[test]
    fn test_retry_policy_reflects_config() {
        let config = ClientConfig::builder()
            .retry_count(5)
            .retry_interval(Duration::from_secs(1))
            .build();

        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
    }
}

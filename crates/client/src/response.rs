//! API response processing
//!
//! Interprets one HTTP response: verifies the expected security headers
//! came back, tracks rate-limit budget, reads the body under a hard
//! timeout, parses JSON with a depth cap, and decides retry-vs-fail.
//!
//! The retry decision is an explicit value (`Disposition::Retry`), not an
//! error thrown for control flow: the executor owns the sleep, this layer
//! owns the verdict, and both compute delays through the same
//! `RetryPolicy`.

use std::sync::Arc;
use std::time::Duration;

use aegis_common::cache::Cache;
use aegis_common::retry::RetryPolicy;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::request::{HEADER_CORRELATION_ID, SECURITY_HEADERS};

/// Hard limit on reading a response body
pub const BODY_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Fallback delay when a 429 carries no `Retry-After`
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(30);

/// Maximum JSON nesting accepted from the wire
pub const MAX_JSON_DEPTH: usize = 32;

/// Warn once remaining rate-limit budget drops below this
pub const RATE_LIMIT_WARN_THRESHOLD: u64 = 10;

/// Cache key for a cached endpoint response
pub fn response_cache_key(endpoint: &str) -> String {
    format!("API:{endpoint}")
}

/// Outcome of processing a response that did not terminally fail
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    /// Parsed payload; `None` for an empty body
    Success(Option<Value>),

    /// Transient condition; retry after sleeping `delay`
    Retry { delay: Duration },
}

/// Rate-limit state reported by the platform
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimit {
    pub limit: Option<u64>,
    pub remaining: Option<u64>,
    pub reset: Option<u64>,
}

impl RateLimit {
    /// Extract rate-limit headers, tolerating absence
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            limit: header_u64(headers, "x-ratelimit-limit"),
            remaining: header_u64(headers, "x-ratelimit-remaining"),
            reset: header_u64(headers, "x-ratelimit-reset"),
        }
    }
}

/// Processes responses for the executor
pub struct ResponseProcessor {
    cache: Arc<Cache>,
    config: ClientConfig,
}

impl ResponseProcessor {
    /// Create a processor sharing the pipeline cache
    pub fn new(cache: Arc<Cache>, config: ClientConfig) -> Self {
        Self { cache, config }
    }

    /// Process one response
    ///
    /// `attempt` is the 1-based number of the send that produced this
    /// response; `retries_left` is the budget remaining after it. A
    /// retryable status with no budget left converts to its terminal
    /// error here, so the executor only ever sees `Retry` when another
    /// attempt is allowed.
    ///
    /// # Errors
    /// Terminal classifications per the status dispatch: 4xx (non-429) is
    /// never retried, exhausted 429 is `LimitExceeded`, exhausted 5xx is
    /// `Connection`, body-read timeout is `Timeout`.
    pub async fn handle(
        &self,
        response: reqwest::Response,
        endpoint: &str,
        use_cache: bool,
        attempt: u32,
        retries_left: u32,
        policy: &RetryPolicy,
    ) -> Result<Disposition, ApiError> {
        let status = response.status();
        let headers = response.headers().clone();

        let correlation_id = headers
            .get(HEADER_CORRELATION_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        self.check_security_headers(&headers, &correlation_id);
        self.track_rate_limit(&headers, &correlation_id);

        // Body is consumed on every path so transport resources release
        // regardless of outcome
        let body = tokio::time::timeout(BODY_READ_TIMEOUT, response.text())
            .await
            .map_err(|_| ApiError::Timeout(BODY_READ_TIMEOUT))?
            .map_err(|e| ApiError::Connection(format!("response body read failed: {e}")))?;

        if status.is_success() {
            return self.handle_success(&body, endpoint, use_cache, &correlation_id);
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let delay = retry_after(&headers).unwrap_or(DEFAULT_RETRY_AFTER);
            if retries_left > 0 {
                warn!(
                    endpoint = %endpoint,
                    correlation_id = %correlation_id,
                    delay_secs = delay.as_secs(),
                    "rate limited, will retry"
                );
                return Ok(Disposition::Retry { delay });
            }
            return Err(ApiError::LimitExceeded(format!(
                "rate limited on {endpoint}: {}",
                diagnostic(&body)
            )));
        }

        if status.is_server_error() {
            if retries_left > 0 {
                let delay = policy.exponential_delay(attempt);
                warn!(
                    endpoint = %endpoint,
                    correlation_id = %correlation_id,
                    status = status.as_u16(),
                    delay_secs = delay.as_secs(),
                    "server error, will retry"
                );
                return Ok(Disposition::Retry { delay });
            }
            return Err(ApiError::Connection(format!(
                "{endpoint} returned {status}: {}",
                diagnostic(&body)
            )));
        }

        // Remaining 4xx statuses are terminal, never retried
        match status {
            StatusCode::NOT_FOUND => {
                Err(ApiError::NotFound(format!("{endpoint}: {}", diagnostic(&body))))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(ApiError::Auth(format!("{endpoint} returned {status}: {}", diagnostic(&body))))
            }
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => Err(ApiError::Validation(
                format!("{endpoint} returned {status}: {}", diagnostic(&body)),
            )),
            other => Err(ApiError::InvalidOperation(format!(
                "{endpoint} returned unexpected status {other}: {}",
                diagnostic(&body)
            ))),
        }
    }

    fn handle_success(
        &self,
        body: &str,
        endpoint: &str,
        use_cache: bool,
        correlation_id: &str,
    ) -> Result<Disposition, ApiError> {
        if body.trim().is_empty() {
            debug!(endpoint = %endpoint, correlation_id = %correlation_id, "empty response body");
            return Ok(Disposition::Success(None));
        }

        let payload: Value = serde_json::from_str(body)
            .map_err(|e| ApiError::Validation(format!("response parse failed: {e}")))?;

        if json_depth(&payload) > MAX_JSON_DEPTH {
            return Err(ApiError::Validation(format!(
                "response JSON exceeds depth limit of {MAX_JSON_DEPTH}"
            )));
        }

        if use_cache {
            let key = response_cache_key(endpoint);
            if let Err(e) =
                self.cache.set(&key, payload.clone(), Some(self.config.response_cache_ttl))
            {
                warn!(key = %key, error = %e, "response not cached, proceeding");
            }
        }

        Ok(Disposition::Success(Some(payload)))
    }

    fn check_security_headers(&self, headers: &HeaderMap, correlation_id: &str) {
        for (name, _) in SECURITY_HEADERS {
            if !headers.contains_key(name) {
                warn!(
                    header = name,
                    correlation_id = %correlation_id,
                    "expected security header missing from response"
                );
            }
        }
    }

    fn track_rate_limit(&self, headers: &HeaderMap, correlation_id: &str) {
        let rate_limit = RateLimit::from_headers(headers);
        if let Some(remaining) = rate_limit.remaining {
            if remaining < RATE_LIMIT_WARN_THRESHOLD {
                warn!(
                    remaining,
                    limit = ?rate_limit.limit,
                    reset = ?rate_limit.reset,
                    correlation_id = %correlation_id,
                    "rate limit budget low"
                );
            }
        }
    }
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.parse().ok()
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Opaque diagnostic text folded into error details, bounded for logs
fn diagnostic(body: &str) -> &str {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>";
    }
    match trimmed.char_indices().nth(512) {
        Some((idx, _)) => &trimmed[..idx],
        None => trimmed,
    }
}

/// Nesting depth of a parsed JSON value (scalars count as 1)
fn json_depth(value: &Value) -> usize {
    match value {
        Value::Object(map) => 1 + map.values().map(json_depth).max().unwrap_or(0),
        Value::Array(items) => 1 + items.iter().map(json_depth).max().unwrap_or(0),
        _ => 1,
    }
}

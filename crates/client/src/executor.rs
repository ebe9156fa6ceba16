//! Pipeline orchestration
//!
//! `ApiExecutor` is the entry point the rest of the system calls. One
//! `execute` drives the whole state machine:
//!
//! `CacheCheck -> BuildRequest -> Send -> ProcessResponse ->
//!  {Success | Retry -> Backoff -> Send | TerminalError -> Report}`
//!
//! Retries are strictly sequential, bounded by the per-call budget, and
//! every delay comes from the shared `RetryPolicy` (429 excepted: the
//! server's `Retry-After` is authoritative). Every failure leaves through
//! the `ErrorReporter`, so callers only ever see sanitized, correlated
//! records.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use aegis_common::cache::{Cache, CacheConfig};
use aegis_common::error::{ErrorRecord, ErrorReporter};
use aegis_common::retry::RetryPolicy;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::config::ClientConfig;
use crate::credentials::CredentialStore;
use crate::error::ApiError;
use crate::request::{ApiRequest, RequestBuilder};
use crate::response::{response_cache_key, Disposition, ResponseProcessor};
use crate::token::TokenManager;

/// Per-call options for `execute_with`
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Serve GETs from the cache and cache their responses
    pub use_cache: bool,

    /// Retry budget after the initial attempt
    pub retry_count: u32,

    /// Base interval the backoff scales from
    pub retry_interval: Duration,

    /// Correlation ID to propagate; generated when absent
    pub correlation_id: Option<String>,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            use_cache: false,
            retry_count: 3,
            retry_interval: Duration::from_secs(2),
            correlation_id: None,
        }
    }
}

impl ExecuteOptions {
    /// Options matching a client configuration
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            retry_count: config.retry_count,
            retry_interval: config.retry_interval,
            ..Self::default()
        }
    }

    /// Enable response caching for this call
    pub fn with_cache(mut self) -> Self {
        self.use_cache = true;
        self
    }

    /// Propagate an existing correlation ID
    pub fn correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }
}

/// Orchestrates request construction, transport, response processing, and
/// the retry loop
pub struct ApiExecutor<S: CredentialStore> {
    config: ClientConfig,
    http: reqwest::Client,
    cache: Arc<Cache>,
    tokens: Arc<TokenManager<S>>,
    builder: RequestBuilder<S>,
    processor: ResponseProcessor,
    reporter: ErrorReporter,
}

impl<S: CredentialStore> ApiExecutor<S> {
    /// Create an executor with its own cache instance
    ///
    /// # Errors
    /// Returns `ApiError::Validation` for an invalid configuration or
    /// `ApiError::InvalidOperation` if the transport cannot be built.
    pub fn new(config: ClientConfig, store: Arc<S>) -> Result<Self, ApiError> {
        Self::with_cache(config, store, Arc::new(Cache::new(CacheConfig::default())))
    }

    /// Create an executor sharing an injected cache instance
    pub fn with_cache(
        config: ClientConfig,
        store: Arc<S>,
        cache: Arc<Cache>,
    ) -> Result<Self, ApiError> {
        config.validate().map_err(|e| ApiError::Validation(e.to_string()))?;

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .min_tls_version(reqwest::tls::Version::TLS_1_2)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| ApiError::InvalidOperation(format!("transport build failed: {e}")))?;

        let tokens = Arc::new(TokenManager::new(store, Arc::clone(&cache), config.clone()));
        let builder = RequestBuilder::new(config.clone(), Arc::clone(&tokens));
        let processor = ResponseProcessor::new(Arc::clone(&cache), config.clone());

        Ok(Self {
            config,
            http,
            cache,
            tokens,
            builder,
            processor,
            reporter: ErrorReporter::new(),
        })
    }

    /// The shared cache instance
    pub fn cache(&self) -> Arc<Cache> {
        Arc::clone(&self.cache)
    }

    /// The token manager backing this executor
    pub fn token_manager(&self) -> Arc<TokenManager<S>> {
        Arc::clone(&self.tokens)
    }

    /// Execute a call with configuration-default options
    pub async fn execute(
        &self,
        endpoint: &str,
        method: Method,
        body: Option<&Value>,
        params: Option<&BTreeMap<String, String>>,
    ) -> Result<Option<Value>, ErrorRecord> {
        self.execute_with(endpoint, method, body, params, ExecuteOptions::from_config(&self.config))
            .await
    }

    /// Execute a call with explicit options
    ///
    /// # Errors
    /// Returns the sanitized `ErrorRecord` produced by the reporter; the
    /// original diagnostic survives in the record's details with sensitive
    /// keys redacted.
    #[instrument(skip(self, body, params, options), fields(endpoint = %endpoint, method = %method))]
    pub async fn execute_with(
        &self,
        endpoint: &str,
        method: Method,
        body: Option<&Value>,
        params: Option<&BTreeMap<String, String>>,
        options: ExecuteOptions,
    ) -> Result<Option<Value>, ErrorRecord> {
        let correlation_id = options
            .correlation_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        match self.run(endpoint, method.clone(), body, params, &options, &correlation_id).await {
            Ok(payload) => Ok(payload),
            Err(error) => {
                let report = error
                    .to_report(&correlation_id)
                    .detail("endpoint", endpoint)
                    .detail("method", method.as_str());
                Err(self.reporter.report(report))
            }
        }
    }

    /// Execute a call and deserialize the payload into a typed value
    ///
    /// Entity kinds with a serialization contract deserialize at this
    /// boundary; an empty body stays `None`.
    ///
    /// # Errors
    /// A payload that does not match `T` is reported as a validation
    /// failure, like any other malformed response.
    pub async fn execute_typed<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        method: Method,
        body: Option<&Value>,
        params: Option<&BTreeMap<String, String>>,
    ) -> Result<Option<T>, ErrorRecord> {
        match self.execute(endpoint, method, body, params).await? {
            Some(value) => match serde_json::from_value(value) {
                Ok(typed) => Ok(Some(typed)),
                Err(e) => {
                    let error =
                        ApiError::Validation(format!("payload deserialization failed: {e}"));
                    let report = error
                        .to_report(&uuid::Uuid::new_v4().to_string())
                        .detail("endpoint", endpoint);
                    Err(self.reporter.report(report))
                }
            },
            None => Ok(None),
        }
    }

    /// Probe the platform's health endpoint (no auth, short timeout)
    ///
    /// # Errors
    /// Returns `ApiError` when the probe cannot complete; an unhealthy but
    /// reachable platform is `Ok(false)`.
    pub async fn health_check(&self) -> Result<bool, ApiError> {
        let url = format!("{}/health", self.config.base_url.trim_end_matches('/'));
        let timeout = Duration::from_secs(5);

        debug!(url = %url, "health check");

        let response = tokio::time::timeout(timeout, self.http.get(&url).send())
            .await
            .map_err(|_| ApiError::Timeout(timeout))?
            .map_err(|e| classify_transport_error(&e, timeout))?;

        if response.status().is_success() {
            info!("platform is healthy");
            Ok(true)
        } else {
            warn!(status = %response.status(), "platform returned non-success status");
            Ok(false)
        }
    }

    async fn run(
        &self,
        endpoint: &str,
        method: Method,
        body: Option<&Value>,
        params: Option<&BTreeMap<String, String>>,
        options: &ExecuteOptions,
        correlation_id: &str,
    ) -> Result<Option<Value>, ApiError> {
        if method == Method::GET && options.use_cache {
            if let Some(hit) = self.cache.get(&response_cache_key(endpoint)) {
                debug!(endpoint = %endpoint, correlation_id = %correlation_id, "cache hit");
                return Ok(Some(hit));
            }
        }

        let request = self
            .builder
            .build(endpoint, method, body, params, Some(correlation_id.to_string()))
            .await?;

        let policy = RetryPolicy::new(options.retry_count, options.retry_interval);
        let total = policy.total_attempts();

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let retries_left = total - attempt;

            match self.send_once(&request).await {
                Ok(response) => {
                    let disposition = self
                        .processor
                        .handle(
                            response,
                            endpoint,
                            options.use_cache,
                            attempt,
                            retries_left,
                            &policy,
                        )
                        .await?;

                    match disposition {
                        Disposition::Success(payload) => {
                            debug!(
                                endpoint = %endpoint,
                                correlation_id = %correlation_id,
                                attempts = attempt,
                                "request succeeded"
                            );
                            return Ok(payload);
                        }
                        Disposition::Retry { delay } => {
                            if retries_left == 0 {
                                return Err(ApiError::Connection(format!(
                                    "request failed after {total} attempts"
                                )));
                            }
                            warn!(
                                endpoint = %endpoint,
                                correlation_id = %correlation_id,
                                attempt,
                                delay_ms = delay.as_millis() as u64,
                                "retrying after backoff"
                            );
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
                Err(error) => {
                    let transient = matches!(
                        error,
                        ApiError::Connection(_) | ApiError::Timeout(_)
                    );

                    if transient && retries_left > 0 {
                        let delay = policy.exponential_delay(attempt);
                        warn!(
                            endpoint = %endpoint,
                            correlation_id = %correlation_id,
                            attempt,
                            error = %error,
                            delay_ms = delay.as_millis() as u64,
                            "transient transport failure, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    if transient {
                        return Err(ApiError::Connection(format!(
                            "request failed after {total} attempts: {error}"
                        )));
                    }

                    return Err(error);
                }
            }
        }
    }

    /// One transmission attempt; the request parts are reused across
    /// attempts, the wire request is rebuilt each time
    async fn send_once(&self, request: &ApiRequest) -> Result<reqwest::Response, ApiError> {
        let mut wire = self
            .http
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());
        if let Some(body) = &request.body {
            wire = wire.body(body.clone());
        }

        match tokio::time::timeout(request.timeout, wire.send()).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(classify_transport_error(&e, request.timeout)),
            Err(_) => Err(ApiError::Timeout(request.timeout)),
        }
    }
}

/// Classify a raw transport failure consistently with the response layer's
/// retry policy: timeouts and connection-level failures are transient
fn classify_transport_error(err: &reqwest::Error, timeout: Duration) -> ApiError {
    if err.is_timeout() {
        ApiError::Timeout(timeout)
    } else {
        ApiError::Connection(format!("transport error: {err}"))
    }
}

//! API request construction
//!
//! Builds a fully-formed, header-stamped request from an endpoint path,
//! method, body, and query parameters. The builder owns everything that
//! must be true of a request before it leaves the process: path safety,
//! the fixed security/tracing header set, the bearer token, and the wire
//! shape of the body (compact JSON, null fields omitted, ISO-8601 UTC
//! dates).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT,
};
use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::config::ClientConfig;
use crate::credentials::CredentialStore;
use crate::error::ApiError;
use crate::token::TokenManager;

/// Request tracing header
pub const HEADER_REQUEST_ID: &str = "x-request-id";

/// Error correlation header
pub const HEADER_CORRELATION_ID: &str = "x-correlation-id";

/// API version header
pub const HEADER_API_VERSION: &str = "x-api-version";

/// Fixed security headers stamped on every request and expected back on
/// every response
pub const SECURITY_HEADERS: [(&str, &str); 4] = [
    ("strict-transport-security", "max-age=31536000; includeSubDomains"),
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    ("x-xss-protection", "1; mode=block"),
];

/// Endpoint paths may only contain these characters
static PATH_SAFE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9/_.-]+$").expect("valid regex"));

/// A fully-formed request, ready for the transport
///
/// Ephemeral: one per call, owned by the call's execution context, dropped
/// when the call completes. Carries its own timeout and retry budget so
/// downstream stages honor per-request overrides.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<String>,
    pub correlation_id: String,
    pub timeout: Duration,
    pub max_retries: u32,
}

/// Constructs requests for the versioned API surface
pub struct RequestBuilder<S: CredentialStore> {
    config: ClientConfig,
    tokens: Arc<TokenManager<S>>,
}

impl<S: CredentialStore> RequestBuilder<S> {
    /// Create a builder bound to a configuration and token manager
    pub fn new(config: ClientConfig, tokens: Arc<TokenManager<S>>) -> Self {
        Self { config, tokens }
    }

    /// Build a request for `endpoint`
    ///
    /// Pulls a validated token from the token manager, stamps the fixed
    /// header set plus a correlation ID, serializes the body, and appends
    /// URL-escaped query parameters.
    ///
    /// # Errors
    /// - `ApiError::Validation` for unsafe paths, unserializable bodies, or
    ///   malformed URLs
    /// - `ApiError::Auth` when no token can be obtained
    pub async fn build(
        &self,
        endpoint: &str,
        method: Method,
        body: Option<&Value>,
        params: Option<&BTreeMap<String, String>>,
        correlation_id: Option<String>,
    ) -> Result<ApiRequest, ApiError> {
        if endpoint.is_empty() || !PATH_SAFE.is_match(endpoint) || endpoint.contains("..") {
            return Err(ApiError::Validation(format!("unsafe endpoint path: '{endpoint}'")));
        }

        let correlation_id = correlation_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let token = self.tokens.get_token(false).await?;

        let mut url = Url::parse(&format!(
            "{}/{}",
            self.config.api_base(),
            endpoint.trim_start_matches('/')
        ))
        .map_err(|e| ApiError::Validation(format!("invalid request URL: {e}")))?;

        if let Some(params) = params {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
        }

        let body = match body {
            Some(value) => Some(
                serde_json::to_string(&strip_nulls(value)).map_err(|e| {
                    ApiError::Validation(format!("body serialization failed: {e}"))
                })?,
            ),
            None => None,
        };

        let headers = self.assemble_headers(&correlation_id, token.token.expose())?;

        debug!(
            method = %method,
            url = %url,
            correlation_id = %correlation_id,
            "request built"
        );

        Ok(ApiRequest {
            method,
            url,
            headers,
            body,
            correlation_id,
            timeout: self.config.request_timeout,
            max_retries: self.config.retry_count,
        })
    }

    fn assemble_headers(
        &self,
        correlation_id: &str,
        token: &str,
    ) -> Result<HeaderMap, ApiError> {
        let mut headers = HeaderMap::new();

        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, parse_value(&self.config.user_agent)?);
        headers.insert(
            HeaderName::from_static(HEADER_API_VERSION),
            parse_value(&self.config.api_version)?,
        );

        for (name, value) in SECURITY_HEADERS {
            headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
        }

        let correlation = parse_value(correlation_id)?;
        headers.insert(HeaderName::from_static(HEADER_REQUEST_ID), correlation.clone());
        headers.insert(HeaderName::from_static(HEADER_CORRELATION_ID), correlation);

        let mut authorization = parse_value(&format!("Bearer {token}"))?;
        authorization.set_sensitive(true);
        headers.insert(AUTHORIZATION, authorization);

        Ok(headers)
    }
}

fn parse_value(value: &str) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(value)
        .map_err(|e| ApiError::Validation(format!("invalid header value: {e}")))
}

/// Drop null object fields recursively so they are omitted from the wire
fn strip_nulls(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), strip_nulls(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(strip_nulls).collect()),
        other => other.clone(),
    }
}

/// Format a timestamp the way the wire expects: ISO-8601 UTC with
/// millisecond precision (`2026-01-02T03:04:05.006Z`)
pub fn iso8601_millis(timestamp: &DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

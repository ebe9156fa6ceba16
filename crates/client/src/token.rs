//! Bearer token lifecycle
//!
//! Obtains, validates, and refreshes the signed bearer token the request
//! builder stamps into every call:
//!
//! - cached tokens are re-validated (signature, expiry with clock-skew
//!   leeway, issuer, audience) on every use, never trusted blindly
//! - generation fetches the caller credential from the external store,
//!   mints an HS256 token, and validates the fresh token before returning
//! - credential fetch and generation each retry up to 3 attempts with
//!   linear backoff
//! - plaintext key material lives in `SecureString` and is zeroized when
//!   dropped
//!
//! The cached entry's TTL is the token lifetime minus a safety margin, so
//! the cache can never serve a token past its `exp` claim even before the
//! read-time validation runs.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use aegis_common::cache::Cache;
use aegis_common::retry::RetryPolicy;
use aegis_common::security::SecureString;
use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::credentials::{Credential, CredentialError, CredentialStore};
use crate::error::ApiError;

/// Well-known cache key for the bearer token
pub const TOKEN_CACHE_KEY: &str = "API:auth-token";

/// Allowed clock-skew window when validating `exp` (5 minutes)
pub const CLOCK_SKEW_LEEWAY_SECS: u64 = 300;

/// Retry attempts for credential fetch and token generation
const AUTH_RETRY_ATTEMPTS: u32 = 3;

/// Base delay for the linear auth backoff (`delay = base * attempt`)
const AUTH_RETRY_BASE_DELAY: Duration = Duration::from_millis(200);

/// Claims carried by a minted token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Issuer
    pub iss: String,

    /// Audience
    pub aud: String,

    /// Subject (credential identity)
    pub sub: String,

    /// Issued at (seconds since epoch)
    pub iat: i64,

    /// Expiry (seconds since epoch)
    pub exp: i64,
}

/// Classified token validation failures
///
/// Each variant maps to its own security sub-code for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenValidationError {
    #[error("token expired")]
    Expired,

    #[error("token signature invalid")]
    BadSignature,

    #[error("token issuer mismatch")]
    BadIssuer,

    #[error("token audience mismatch")]
    BadAudience,

    #[error("token validation failed: {0}")]
    Unknown(String),
}

impl TokenValidationError {
    /// Security-category error code for this violation
    pub fn code(&self) -> u32 {
        match self {
            Self::Expired => 6001,
            Self::BadSignature => 6002,
            Self::BadIssuer => 6003,
            Self::BadAudience => 6004,
            Self::Unknown(_) => 6005,
        }
    }
}

/// A validated bearer token and its claims
#[derive(Debug, Clone)]
pub struct AuthToken {
    /// Compact token, zeroized on drop
    pub token: SecureString,

    /// Validated claims
    pub claims: TokenClaims,
}

/// Manages the bearer token lifecycle, backed by the shared cache and an
/// external credential store
pub struct TokenManager<S: CredentialStore> {
    store: Arc<S>,
    cache: Arc<Cache>,
    config: ClientConfig,
    /// Signing key of the last generation, kept so cached tokens can be
    /// signature-checked without a store round trip. A fresh process that
    /// finds a cached token but holds no key regenerates instead.
    signing_key: RwLock<Option<SecureString>>,
}

impl<S: CredentialStore> TokenManager<S> {
    /// Create a token manager over a credential store and the shared cache
    pub fn new(store: Arc<S>, cache: Arc<Cache>, config: ClientConfig) -> Self {
        Self { store, cache, config, signing_key: RwLock::new(None) }
    }

    /// Get a valid bearer token
    ///
    /// With `force == false` a cached token is re-validated and reused;
    /// anything invalid or absent falls through to generation. With
    /// `force == true` the cache is bypassed and a fresh token minted.
    ///
    /// # Errors
    /// Returns `ApiError::Auth` when credentials cannot be fetched or a
    /// token cannot be generated within the retry budget.
    pub async fn get_token(&self, force: bool) -> Result<AuthToken, ApiError> {
        if !force {
            if let Some(token) = self.cached_token() {
                debug!("reusing cached token");
                return Ok(token);
            }
        }

        self.generate_token().await
    }

    /// Validate a token against the remembered signing key
    ///
    /// # Errors
    /// Returns the classified violation; `Unknown` when no signing key is
    /// held in this process.
    pub fn validate(&self, token: &str) -> Result<TokenClaims, TokenValidationError> {
        let guard = self
            .signing_key
            .read()
            .map_err(|_| TokenValidationError::Unknown("signing key lock poisoned".into()))?;
        let key = guard
            .as_ref()
            .ok_or_else(|| TokenValidationError::Unknown("no signing key held".into()))?;
        self.validate_with_key(token, key)
    }

    /// Drop the cached token and the remembered signing key (logout)
    pub fn invalidate(&self) {
        self.cache.remove(TOKEN_CACHE_KEY);
        if let Ok(mut guard) = self.signing_key.write() {
            *guard = None;
        }
        debug!("token invalidated");
    }

    /// Re-validate and return the cached token, if any
    fn cached_token(&self) -> Option<AuthToken> {
        let value = self.cache.get_verified(TOKEN_CACHE_KEY)?;
        let token = value.as_str()?.to_string();

        let guard = self.signing_key.read().ok()?;
        let key = guard.as_ref()?;

        match self.validate_with_key(&token, key) {
            Ok(claims) => Some(AuthToken { token: SecureString::new(token), claims }),
            Err(violation) => {
                warn!(code = violation.code(), error = %violation, "cached token rejected");
                drop(guard);
                self.cache.remove(TOKEN_CACHE_KEY);
                None
            }
        }
    }

    /// Fetch credentials and mint a fresh token, retrying both stages
    async fn generate_token(&self) -> Result<AuthToken, ApiError> {
        let policy = RetryPolicy::new(AUTH_RETRY_ATTEMPTS, AUTH_RETRY_BASE_DELAY);
        let credential = self.fetch_credential(&policy).await?;

        let mut last_error = ApiError::Auth("token generation failed".to_string());
        for attempt in 1..=AUTH_RETRY_ATTEMPTS {
            match self.mint_and_validate(&credential) {
                Ok(auth) => {
                    if let Ok(mut guard) = self.signing_key.write() {
                        *guard = Some(credential.api_key.clone());
                    }

                    let entry = Value::String(auth.token.expose().to_string());
                    if let Err(e) =
                        self.cache.set(TOKEN_CACHE_KEY, entry, Some(self.config.token_cache_ttl()))
                    {
                        warn!(error = %e, "token not cached, proceeding uncached");
                    }

                    debug!(sub = %auth.claims.sub, exp = auth.claims.exp, "token generated");
                    return Ok(auth);
                }
                Err(e) => {
                    warn!(attempt, error = %e, "token generation attempt failed");
                    last_error = e;
                    if attempt < AUTH_RETRY_ATTEMPTS {
                        tokio::time::sleep(policy.linear_delay(attempt)).await;
                    }
                }
            }
        }

        Err(last_error)
    }

    async fn fetch_credential(&self, policy: &RetryPolicy) -> Result<Credential, ApiError> {
        let mut last_error = CredentialError::NotFound;
        for attempt in 1..=AUTH_RETRY_ATTEMPTS {
            match self.store.fetch().await {
                Ok(credential) => return Ok(credential),
                Err(e) => {
                    warn!(attempt, error = %e, "credential fetch attempt failed");
                    last_error = e;
                    if attempt < AUTH_RETRY_ATTEMPTS {
                        tokio::time::sleep(policy.linear_delay(attempt)).await;
                    }
                }
            }
        }

        Err(ApiError::Auth(format!("credential fetch failed: {last_error}")))
    }

    /// Mint a signed token and validate it before handing it out
    fn mint_and_validate(&self, credential: &Credential) -> Result<AuthToken, ApiError> {
        let now = Utc::now();
        let lifetime = chrono::Duration::from_std(self.config.token_ttl)
            .map_err(|e| ApiError::InvalidOperation(format!("token ttl out of range: {e}")))?;

        let claims = TokenClaims {
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
            sub: credential.identity.clone(),
            iat: now.timestamp(),
            exp: (now + lifetime).timestamp(),
        };

        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(credential.api_key.expose_bytes()),
        )
        .map_err(|e| ApiError::Auth(format!("token encoding failed: {e}")))?;

        // Self-check: never hand out a token this process cannot validate
        let claims = self.validate_with_key(&token, &credential.api_key)?;

        Ok(AuthToken { token: SecureString::new(token), claims })
    }

    /// Validate signature, expiry (with skew leeway), issuer, and audience
    fn validate_with_key(
        &self,
        token: &str,
        key: &SecureString,
    ) -> Result<TokenClaims, TokenValidationError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = CLOCK_SKEW_LEEWAY_SECS;
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_audience(&[&self.config.audience]);

        match jsonwebtoken::decode::<TokenClaims>(
            token,
            &DecodingKey::from_secret(key.expose_bytes()),
            &validation,
        ) {
            Ok(data) => Ok(data.claims),
            Err(e) => Err(match e.kind() {
                ErrorKind::ExpiredSignature => TokenValidationError::Expired,
                ErrorKind::InvalidSignature => TokenValidationError::BadSignature,
                ErrorKind::InvalidIssuer => TokenValidationError::BadIssuer,
                ErrorKind::InvalidAudience => TokenValidationError::BadAudience,
                other => TokenValidationError::Unknown(format!("{other:?}")),
            }),
        }
    }
}

//! Long-lived credential storage
//!
//! Credentials (API key + identity) outlive the process and live in the
//! platform secret service (macOS Keychain, Windows Credential Manager,
//! Linux Secret Service). Each field is stored under its own account entry
//! so partial writes never produce a half-readable credential.
//!
//! The in-memory store exists for tests and ephemeral environments; it
//! holds the same `Credential` shape behind the same trait.

use std::sync::Mutex;

use aegis_common::security::SecureString;
use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

const IDENTITY_PREFIX: &str = "identity.";
const API_KEY_PREFIX: &str = "apikey.";
const API_URL_PREFIX: &str = "apiurl.";

/// Caller credential fetched from the store
#[derive(Debug, Clone)]
pub struct Credential {
    /// Identity the credential was issued to (becomes the token subject)
    pub identity: String,

    /// API key used as signing material, zeroized on drop
    pub api_key: SecureString,

    /// Optional per-credential API origin override
    pub api_url: Option<String>,
}

/// Error type for credential store operations
#[derive(Debug, Error)]
pub enum CredentialError {
    /// No credential stored for the configured account
    #[error("no credential found for account")]
    NotFound,

    /// The underlying secret service failed
    #[error("credential store error: {0}")]
    Backend(String),
}

/// External credential store collaborator
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Fetch the caller credential
    async fn fetch(&self) -> Result<Credential, CredentialError>;
}

/// Credential store backed by the platform keychain
pub struct KeyringCredentialStore {
    service: String,
    account: String,
}

impl KeyringCredentialStore {
    /// Create a store scoped to a service/account pair
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self { service: service.into(), account: account.into() }
    }

    /// Persist a credential in the platform keychain
    ///
    /// # Errors
    /// Returns `CredentialError::Backend` if any keychain write fails.
    pub fn store(&self, credential: &Credential) -> Result<(), CredentialError> {
        debug!(account = %self.account, "storing credential");

        self.set_secret(IDENTITY_PREFIX, &credential.identity)?;
        self.set_secret(API_KEY_PREFIX, credential.api_key.expose())?;
        if let Some(url) = &credential.api_url {
            self.set_secret(API_URL_PREFIX, url)?;
        }

        Ok(())
    }

    /// Delete the stored credential (idempotent)
    pub fn delete(&self) -> Result<(), CredentialError> {
        debug!(account = %self.account, "deleting credential");

        let _ = self.delete_secret(IDENTITY_PREFIX);
        let _ = self.delete_secret(API_KEY_PREFIX);
        let _ = self.delete_secret(API_URL_PREFIX);

        Ok(())
    }

    fn entry(&self, prefix: &str) -> Result<keyring::Entry, CredentialError> {
        keyring::Entry::new(&self.service, &format!("{}{}", prefix, self.account))
            .map_err(|e| CredentialError::Backend(e.to_string()))
    }

    fn get_secret(&self, prefix: &str) -> Result<String, CredentialError> {
        self.entry(prefix)?.get_password().map_err(|e| match e {
            keyring::Error::NoEntry => CredentialError::NotFound,
            other => CredentialError::Backend(other.to_string()),
        })
    }

    fn set_secret(&self, prefix: &str, value: &str) -> Result<(), CredentialError> {
        self.entry(prefix)?
            .set_password(value)
            .map_err(|e| CredentialError::Backend(e.to_string()))
    }

    fn delete_secret(&self, prefix: &str) -> Result<(), CredentialError> {
        self.entry(prefix)?
            .delete_credential()
            .map_err(|e| CredentialError::Backend(e.to_string()))
    }
}

#[async_trait]
impl CredentialStore for KeyringCredentialStore {
    async fn fetch(&self) -> Result<Credential, CredentialError> {
        let identity = self.get_secret(IDENTITY_PREFIX)?;
        let api_key = SecureString::new(self.get_secret(API_KEY_PREFIX)?);

        let api_url = match self.get_secret(API_URL_PREFIX) {
            Ok(url) => Some(url),
            Err(CredentialError::NotFound) => None,
            Err(other) => return Err(other),
        };

        Ok(Credential { identity, api_key, api_url })
    }
}

/// In-memory credential store for tests
#[derive(Default)]
pub struct MemoryCredentialStore {
    inner: Mutex<Option<Credential>>,
}

impl MemoryCredentialStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-seeded with a credential
    pub fn with_credential(credential: Credential) -> Self {
        Self { inner: Mutex::new(Some(credential)) }
    }

    /// Replace the stored credential
    pub fn set(&self, credential: Credential) {
        // Test utility: panic on poisoned mutex to fail tests early
        *self.inner.lock().expect("mutex poisoned") = Some(credential);
    }

    /// Remove the stored credential
    pub fn clear(&self) {
        // Test utility: panic on poisoned mutex to fail tests early
        *self.inner.lock().expect("mutex poisoned") = None;
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn fetch(&self) -> Result<Credential, CredentialError> {
        self.inner
            .lock()
            .map_err(|_| CredentialError::Backend("store mutex poisoned".to_string()))?
            .clone()
            .ok_or(CredentialError::NotFound)
    }
}

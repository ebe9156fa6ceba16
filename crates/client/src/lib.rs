//! Client library for the Aegis cybersecurity platform API
//!
//! Turns unreliable network calls into dependable, observable operations:
//! request construction, transmission with bounded retry/backoff, response
//! validation and parsing, bearer-token lifecycle, and a shared response
//! cache.
//!
//! The pipeline for one call:
//!
//! ```text
//! ApiExecutor::execute
//!   -> cache check (GET + use_cache)
//!   -> RequestBuilder::build (token from TokenManager)
//!   -> transport send
//!   -> ResponseProcessor::handle -> Success | Retry { delay }
//!   -> backoff loop, bounded by the retry budget
//! ```
//!
//! Only [`executor::ApiExecutor`], [`token::TokenManager`], and the cache
//! it shares are meant to be driven from outside; everything else is
//! plumbing those entry points own.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod config;
pub mod credentials;
pub mod error;
pub mod executor;
pub mod request;
pub mod response;
pub mod token;

// Re-export the entry points and their companions
pub use config::ClientConfig;
pub use credentials::{Credential, CredentialStore, KeyringCredentialStore, MemoryCredentialStore};
pub use error::ApiError;
pub use executor::{ApiExecutor, ExecuteOptions};
pub use token::{AuthToken, TokenManager};

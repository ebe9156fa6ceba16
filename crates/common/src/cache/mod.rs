//! Thread-safe expiring response/token cache
//!
//! The one piece of shared mutable state in the pipeline. Entries carry a
//! TTL and an integrity hash of their serialized value; expiry is checked
//! lazily at read time, so no background sweep is required for correctness.
//! A byte-estimate threshold triggers a best-effort sweep of expired
//! entries under memory pressure.
//!
//! # Example
//! ```
//! use std::time::Duration;
//!
//! use aegis_common::cache::{Cache, CacheConfig};
//! use serde_json::json;
//!
//! let cache = Cache::new(CacheConfig::default());
//! cache.set("API:/assets", json!({"id": "a1"}), Some(Duration::from_secs(300))).unwrap();
//! assert_eq!(cache.get("API:/assets"), Some(json!({"id": "a1"})));
//! ```

mod config;
mod core;
mod stats;

pub use config::{CacheConfig, CacheConfigBuilder};
pub use core::{Cache, CacheError, EntryInfo};
pub use stats::CacheStats;

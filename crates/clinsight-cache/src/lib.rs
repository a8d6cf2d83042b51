//! Clinsight Cache
//!
//! Content-addressed, encrypted, size-bounded persistent cache for report
//! pipeline outputs.
//!
//! # Core Concepts
//!
//! - [`CacheKey`]: SHA-256 digest over an ordered list of JSON components
//! - [`CacheCipher`]: AES-256-GCM under a single PBKDF2-derived key
//! - [`ReportCache`]: sled-backed store with opportunistic LRU vacuum
//!
//! # Design Notes
//!
//! Values are encrypted before they touch disk; a record that fails to
//! decrypt (tampered, or written under different key material) degrades to a
//! cache miss rather than an error. Eviction is best-effort: every `set`
//! spawns a vacuum behind a single-writer lock, so the store converges to at
//! most `max_entries` records but may briefly exceed it between writes.
//!
//! Key material is injected configuration, never an embedded constant.
//!
//! # Example
//!
//! ```rust,ignore
//! use clinsight_cache::{CacheConfig, CacheKey, KeyMaterial, ReportCache};
//! use serde_json::json;
//!
//! let cache = ReportCache::open(CacheConfig::new(dir, KeyMaterial::new(passphrase, salt)))?;
//! let key = CacheKey::derive(&[json!(patient_data), json!("v1")])?;
//! cache.set(&key, &value.into()).await?;
//! let hit = cache.get(&key).await;
//! ```

#![warn(unreachable_pub)]

mod crypto;
mod error;
mod key;
mod store;

pub use crypto::{CacheCipher, CryptoError, KeyMaterial};
pub use error::CacheError;
pub use key::{CacheKey, KeyError};
pub use store::{CacheConfig, CacheEntrySnapshot, ReportCache, DEFAULT_MAX_ENTRIES};

//! Error types for the cache crate
//!
//! Only failures that matter to a caller surface here: persistence-layer
//! errors and serialization failures. Decryption failures never escape the
//! store; they degrade to cache misses per the error-containment policy.

use crate::crypto::CryptoError;
use crate::key::KeyError;

/// Errors surfaced by cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Persistence layer unavailable or write failed
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Payload (de)serialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Encryption failed before write
    #[error("encryption error: {0}")]
    Encryption(#[from] CryptoError),

    /// Key derivation or parsing failed
    #[error("key error: {0}")]
    Key(#[from] KeyError),
}

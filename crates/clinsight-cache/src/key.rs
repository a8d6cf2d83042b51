//! Content-addressed cache keys
//!
//! A [`CacheKey`] is the SHA-256 digest of the canonical JSON serialization
//! of an ordered component list. Derivation is pure: structurally equal
//! component lists always produce the same key, and any change to a
//! component or to their order produces a different key.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// A 32-byte content-addressed cache key.
///
/// Displays as 64 lowercase hex characters. Immutable and cheap to clone
/// (Copy).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    /// Create a key from raw digest bytes.
    #[inline]
    #[must_use]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get reference to the underlying bytes.
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Derive a key from an ordered list of JSON-serializable components.
    ///
    /// The components are serialized as a single JSON array, so both the
    /// component values and their order feed the digest.
    ///
    /// # Errors
    /// Returns [`KeyError::Serialization`] if the component list cannot be
    /// serialized (not reachable for well-formed [`Value`]s).
    pub fn derive(components: &[Value]) -> Result<Self, KeyError> {
        let canonical = serde_json::to_vec(components)?;
        let digest = Sha256::digest(&canonical);
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Ok(Self(bytes))
    }

    /// Create a key from a byte slice.
    ///
    /// # Errors
    /// Returns an error if the slice is not exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != 32 {
            return Err(KeyError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    /// Short hex prefix for log lines (first 8 bytes).
    #[inline]
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for CacheKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        Self::from_slice(&bytes)
    }
}

impl AsRef<[u8]> for CacheKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Errors that can occur when deriving or parsing cache keys.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    /// Wrong digest length
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Hex decoding failed
    #[error("hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),

    /// Component serialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

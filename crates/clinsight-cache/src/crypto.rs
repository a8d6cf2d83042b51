//! Symmetric encryption for persisted cache values
//!
//! A single AES-256-GCM key is derived once per cache instance via
//! PBKDF2-HMAC-SHA256 from injected key material, then reused for every
//! entry. Each encryption draws a fresh 12-byte nonce from the OS RNG; nonce
//! reuse under the same key would break confidentiality, so nonces are never
//! cached or derived from content.

use aes_gcm::aead::{Aead, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, KeyInit};
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use std::fmt;

/// AES-GCM nonce length in bytes.
pub(crate) const NONCE_LEN: usize = 12;

/// Minimum PBKDF2 iteration count accepted at derivation time.
const MIN_KDF_ITERATIONS: u32 = 100_000;

/// Injected key-derivation inputs for the cache cipher.
///
/// This is deliberately configuration, not a constant: deployments own the
/// passphrase and salt. The scheme protects data at rest from casual
/// inspection, not from an attacker who can read process configuration.
#[derive(Clone)]
pub struct KeyMaterial {
    passphrase: String,
    salt: Vec<u8>,
    iterations: u32,
}

impl KeyMaterial {
    /// Create key material with the default iteration count (100,000).
    #[must_use]
    pub fn new(passphrase: impl Into<String>, salt: impl Into<Vec<u8>>) -> Self {
        Self {
            passphrase: passphrase.into(),
            salt: salt.into(),
            iterations: MIN_KDF_ITERATIONS,
        }
    }

    /// Override the PBKDF2 iteration count. Values below 100,000 are clamped
    /// up to the minimum.
    #[inline]
    #[must_use]
    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations.max(MIN_KDF_ITERATIONS);
        self
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print the passphrase or salt.
        f.debug_struct("KeyMaterial")
            .field("iterations", &self.iterations)
            .finish_non_exhaustive()
    }
}

/// AEAD cipher holding the single derived 256-bit key.
#[derive(Clone)]
pub struct CacheCipher {
    cipher: Aes256Gcm,
}

impl CacheCipher {
    /// Derive the cipher key from the given material.
    ///
    /// Derivation runs once; the resulting key lives for the lifetime of the
    /// cache instance.
    #[must_use]
    pub fn derive(material: &KeyMaterial) -> Self {
        let mut key_bytes = [0u8; 32];
        pbkdf2_hmac::<Sha256>(
            material.passphrase.as_bytes(),
            &material.salt,
            material.iterations,
            &mut key_bytes,
        );
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));
        Self { cipher }
    }

    /// Encrypt a plaintext, returning the ciphertext and the fresh nonce
    /// used for this operation.
    ///
    /// # Errors
    /// Returns [`CryptoError::Encrypt`] if the AEAD backend rejects the input.
    pub fn seal(&self, plaintext: &[u8]) -> Result<(Vec<u8>, [u8; NONCE_LEN]), CryptoError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| CryptoError::Encrypt)?;
        Ok((ciphertext, nonce.into()))
    }

    /// Decrypt a ciphertext produced by [`CacheCipher::seal`].
    ///
    /// # Errors
    /// Returns [`CryptoError::Decrypt`] for tampered ciphertext or material
    /// derived from a different passphrase/salt.
    pub fn open(
        &self,
        ciphertext: &[u8],
        nonce: &[u8; NONCE_LEN],
    ) -> Result<Vec<u8>, CryptoError> {
        self.cipher
            .decrypt(nonce.into(), ciphertext)
            .map_err(|_| CryptoError::Decrypt)
    }
}

impl fmt::Debug for CacheCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CacheCipher(aes-256-gcm)")
    }
}

/// Errors from the cache cipher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    /// AEAD encryption failed
    #[error("encryption failed")]
    Encrypt,

    /// AEAD decryption failed: ciphertext tampered or foreign key material
    #[error("decryption failed: ciphertext tampered or wrong key material")]
    Decrypt,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_material() -> KeyMaterial {
        // Low-ish iteration floor still applies; tests pay the real KDF cost
        // once per cipher.
        KeyMaterial::new("test-passphrase", b"test-salt".to_vec())
    }

    #[test]
    fn seal_open_round_trip() {
        let cipher = CacheCipher::derive(&test_material());
        let (ciphertext, nonce) = cipher.seal(b"clinical report text").unwrap();
        let plaintext = cipher.open(&ciphertext, &nonce).unwrap();
        assert_eq!(plaintext, b"clinical report text");
    }

    #[test]
    fn nonces_are_unique_per_seal() {
        let cipher = CacheCipher::derive(&test_material());
        let (_, n1) = cipher.seal(b"same input").unwrap();
        let (_, n2) = cipher.seal(b"same input").unwrap();
        assert_ne!(n1, n2);
    }

    #[test]
    fn ciphertext_differs_from_plaintext() {
        let cipher = CacheCipher::derive(&test_material());
        let (ciphertext, _) = cipher.seal(b"sensitive").unwrap();
        assert_ne!(&ciphertext[..], b"sensitive");
    }

    #[test]
    fn tampered_ciphertext_fails_to_open() {
        let cipher = CacheCipher::derive(&test_material());
        let (mut ciphertext, nonce) = cipher.seal(b"payload").unwrap();
        ciphertext[0] ^= 0xff;
        assert_eq!(cipher.open(&ciphertext, &nonce), Err(CryptoError::Decrypt));
    }

    #[test]
    fn foreign_key_material_fails_to_open() {
        let cipher = CacheCipher::derive(&test_material());
        let other = CacheCipher::derive(&KeyMaterial::new("other", b"other-salt".to_vec()));
        let (ciphertext, nonce) = cipher.seal(b"payload").unwrap();
        assert_eq!(other.open(&ciphertext, &nonce), Err(CryptoError::Decrypt));
    }

    #[test]
    fn iteration_count_is_clamped_to_minimum() {
        let material = test_material().with_iterations(10);
        assert_eq!(material.iterations, 100_000);
    }

    #[test]
    fn debug_never_leaks_secrets() {
        let material = KeyMaterial::new("hunter2", b"pepper".to_vec());
        let rendered = format!("{material:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("pepper"));
    }
}

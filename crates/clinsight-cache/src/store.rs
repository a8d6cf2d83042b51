//! Bounded encrypted cache store
//!
//! sled-backed persistent store keyed by [`CacheKey`]. Every value is
//! encrypted before insertion and decrypted on read; a record that cannot be
//! decrypted or decoded degrades to a miss. After every write a vacuum task
//! is spawned that evicts the oldest-by-`last_used` records once the entry
//! count exceeds the configured maximum.
//!
//! The vacuum runs behind a single-writer lock, so concurrent vacuums
//! serialize and repeated runs are no-ops. It is still not transactionally
//! isolated from concurrent `set`/`get`, so the bound is eventual rather
//! than strict between writes.

use crate::crypto::{CacheCipher, KeyMaterial, NONCE_LEN};
use crate::error::CacheError;
use crate::key::CacheKey;
use chrono::Utc;
use clinsight_core::CachedValue;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Default maximum entry count after a completed vacuum.
pub const DEFAULT_MAX_ENTRIES: usize = 50;

/// Store identity: tree name prefix plus version. Bumping the version opens
/// a fresh tree and drops trees left by older versions.
const STORE_TREE_PREFIX: &str = "reports_";
const STORE_VERSION: u32 = 2;

/// Configuration for opening a [`ReportCache`].
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Directory for the sled database
    pub path: PathBuf,
    /// Maximum entries retained after vacuum
    pub max_entries: usize,
    /// Injected key-derivation inputs
    pub key_material: KeyMaterial,
}

impl CacheConfig {
    /// Create a config with the default entry bound.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, key_material: KeyMaterial) -> Self {
        Self {
            path: path.into(),
            max_entries: DEFAULT_MAX_ENTRIES,
            key_material,
        }
    }

    /// Override the maximum entry count.
    #[inline]
    #[must_use]
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }
}

/// On-disk record for one cache entry. Owned exclusively by the store;
/// plaintext never touches disk.
#[derive(Debug, Serialize, Deserialize)]
struct CacheRecord {
    ciphertext: Vec<u8>,
    nonce: [u8; NONCE_LEN],
    last_used: i64,
}

/// A decrypted view of one entry, as returned by [`ReportCache::entries`].
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntrySnapshot {
    /// The entry's content-addressed key
    pub key: CacheKey,
    /// The decrypted payload
    pub value: CachedValue,
    /// Millisecond epoch timestamp of the last read or write
    pub last_used: i64,
}

/// Encrypted, size-bounded, content-addressed persistent cache.
///
/// Cloning is cheap; clones share the same underlying tree, cipher, and
/// vacuum lock.
#[derive(Debug, Clone)]
pub struct ReportCache {
    tree: sled::Tree,
    cipher: CacheCipher,
    max_entries: usize,
    vacuum_lock: Arc<Mutex<()>>,
}

impl ReportCache {
    /// Open (or create) the cache at the configured path.
    ///
    /// Trees written by older store versions are dropped on open; a version
    /// bump therefore invalidates existing records rather than attempting to
    /// read them under changed semantics.
    ///
    /// # Errors
    /// Returns [`CacheError::Storage`] if the database cannot be opened.
    pub fn open(config: CacheConfig) -> Result<Self, CacheError> {
        let db = sled::open(&config.path)?;
        let current = format!("{STORE_TREE_PREFIX}v{STORE_VERSION}");

        for name in db.tree_names() {
            if name == current.as_bytes() {
                continue;
            }
            if name.starts_with(STORE_TREE_PREFIX.as_bytes()) {
                db.drop_tree(&name)?;
                info!(
                    tree = %String::from_utf8_lossy(&name),
                    "dropped stale cache tree from older store version"
                );
            }
        }

        let tree = db.open_tree(current.as_bytes())?;
        Ok(Self {
            tree,
            cipher: CacheCipher::derive(&config.key_material),
            max_entries: config.max_entries,
            vacuum_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Look up a value by key.
    ///
    /// Absent keys return `None` with no side effect. Hits touch the entry's
    /// `last_used` timestamp in a spawned task that `get` does not wait on.
    /// Storage, decryption, and decode failures all degrade to a logged
    /// miss; this method never fails.
    pub async fn get(&self, key: &CacheKey) -> Option<CachedValue> {
        let raw = match self.tree.get(key.as_bytes()) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %key.short(), error = %e, "cache read failed, treating as miss");
                return None;
            }
        };

        let record: CacheRecord = match serde_json::from_slice(&raw) {
            Ok(record) => record,
            Err(e) => {
                warn!(key = %key.short(), error = %e, "cache record malformed, treating as miss");
                return None;
            }
        };

        self.spawn_touch(*key);

        let plaintext = match self.cipher.open(&record.ciphertext, &record.nonce) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                warn!(key = %key.short(), error = %e, "cache entry failed to decrypt, treating as miss");
                return None;
            }
        };

        match serde_json::from_slice(&plaintext) {
            Ok(value) => {
                debug!(key = %key.short(), "cache hit");
                Some(value)
            }
            Err(e) => {
                warn!(key = %key.short(), error = %e, "cache payload malformed, treating as miss");
                None
            }
        }
    }

    /// Store a value under a key, overwriting any prior entry.
    ///
    /// A fresh nonce is drawn per write. Completion does not imply the
    /// opportunistic vacuum has run.
    ///
    /// # Errors
    /// Returns [`CacheError`] if serialization, encryption, or the write
    /// itself fails; the store is unchanged for that key on failure.
    pub async fn set(&self, key: &CacheKey, value: &CachedValue) -> Result<(), CacheError> {
        let plaintext = serde_json::to_vec(value)?;
        let (ciphertext, nonce) = self.cipher.seal(&plaintext)?;
        let record = CacheRecord {
            ciphertext,
            nonce,
            last_used: Utc::now().timestamp_millis(),
        };
        self.tree.insert(key.as_bytes(), serde_json::to_vec(&record)?)?;
        debug!(key = %key.short(), "cache entry written");

        let cache = self.clone();
        tokio::spawn(async move {
            cache.vacuum().await;
        });
        Ok(())
    }

    /// Evict oldest entries until the store holds at most `max_entries`.
    ///
    /// Serialized behind a single-writer lock: concurrent invocations queue,
    /// and a run that finds the store within bounds is a no-op. Enumeration
    /// failures abort the pass; the next write retries.
    pub async fn vacuum(&self) {
        let _guard = self.vacuum_lock.lock().await;

        let mut entries: Vec<(sled::IVec, i64)> = Vec::new();
        for item in self.tree.iter() {
            match item {
                Ok((raw_key, raw)) => {
                    // Unreadable records sort oldest and go first.
                    let last_used = serde_json::from_slice::<CacheRecord>(&raw)
                        .map(|r| r.last_used)
                        .unwrap_or(0);
                    entries.push((raw_key, last_used));
                }
                Err(e) => {
                    warn!(error = %e, "vacuum enumeration failed, skipping pass");
                    return;
                }
            }
        }

        if entries.len() <= self.max_entries {
            return;
        }

        entries.sort_by_key(|(_, last_used)| *last_used);
        let excess = entries.len() - self.max_entries;
        for (raw_key, _) in entries.into_iter().take(excess) {
            if let Err(e) = self.tree.remove(&raw_key) {
                warn!(error = %e, "vacuum eviction failed for one entry");
            }
        }
        debug!(evicted = excess, retained = self.max_entries, "vacuum completed");
    }

    /// Decrypt and return all entries, ordered by `last_used` descending.
    ///
    /// Entries that fail to decrypt or decode are logged and skipped rather
    /// than failing the whole call.
    ///
    /// # Errors
    /// Returns [`CacheError::Storage`] only if enumeration itself fails.
    pub fn entries(&self) -> Result<Vec<CacheEntrySnapshot>, CacheError> {
        let mut snapshots = Vec::new();
        for item in self.tree.iter() {
            let (raw_key, raw) = item?;
            let key = match CacheKey::from_slice(&raw_key) {
                Ok(key) => key,
                Err(e) => {
                    warn!(error = %e, "skipping entry with malformed key");
                    continue;
                }
            };
            let record: CacheRecord = match serde_json::from_slice(&raw) {
                Ok(record) => record,
                Err(e) => {
                    warn!(key = %key.short(), error = %e, "skipping malformed record");
                    continue;
                }
            };
            let value = match self
                .cipher
                .open(&record.ciphertext, &record.nonce)
                .map_err(CacheError::from)
                .and_then(|p| serde_json::from_slice(&p).map_err(CacheError::from))
            {
                Ok(value) => value,
                Err(e) => {
                    warn!(key = %key.short(), error = %e, "skipping undecryptable entry");
                    continue;
                }
            };
            snapshots.push(CacheEntrySnapshot {
                key,
                value,
                last_used: record.last_used,
            });
        }
        snapshots.sort_by_key(|s| std::cmp::Reverse(s.last_used));
        Ok(snapshots)
    }

    /// Remove all entries.
    ///
    /// # Errors
    /// Returns [`CacheError::Storage`] if the clear fails.
    pub fn clear(&self) -> Result<(), CacheError> {
        self.tree.clear()?;
        Ok(())
    }

    /// Current entry count.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// Whether the store holds no entries.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Fire-and-forget `last_used` refresh. Timestamps are monotonically
    /// non-decreasing per key: a touch never moves an entry backwards.
    fn spawn_touch(&self, key: CacheKey) {
        let tree = self.tree.clone();
        tokio::spawn(async move {
            let now = Utc::now().timestamp_millis();
            let result = tree.fetch_and_update(key.as_bytes(), |old| {
                old.map(|raw| match serde_json::from_slice::<CacheRecord>(raw) {
                    Ok(mut record) => {
                        record.last_used = record.last_used.max(now);
                        serde_json::to_vec(&record).unwrap_or_else(|_| raw.to_vec())
                    }
                    Err(_) => raw.to_vec(),
                })
            });
            if let Err(e) = result {
                warn!(key = %key.short(), error = %e, "last_used touch failed");
            }
        });
    }
}

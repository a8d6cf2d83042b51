//! Pipeline-level errors
//!
//! Anything that crosses the per-lens isolation boundary. Callers receive no
//! partial mapping when one of these surfaces; the retained last-known-good
//! state is left untouched.

use clinsight_cache::{CacheError, KeyError};

/// A failure outside the per-lens isolation boundaries.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Cache-key derivation failed for a pipeline-critical key
    #[error("cache key derivation failed: {0}")]
    Key(#[from] KeyError),

    /// The cache store failed in a way no fallback covers
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),
}

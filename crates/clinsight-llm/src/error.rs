//! Error taxonomy for consumed LLM interfaces
//!
//! Each error maps to one isolation boundary in the pipeline: a
//! `GenerationError` costs one lens, a `VerificationError` costs one
//! verification result, a `MetricsError` falls back to neutral defaults, and
//! a `ChatError` becomes a transcript entry. None of them abort the run.

use clinsight_core::MetricsRangeError;

/// A lens-generation call or stream failed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GenerationError {
    /// Provider rejected or aborted the call
    #[error("provider error: {0}")]
    Provider(String),

    /// The stream ended abnormally mid-section
    #[error("stream interrupted: {0}")]
    StreamInterrupted(String),
}

/// Metrics generation produced an unusable payload.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MetricsError {
    /// Provider call failed outright
    #[error("provider error: {0}")]
    Provider(String),

    /// Payload did not parse into the expected shape
    #[error("malformed metrics payload: {0}")]
    Malformed(String),

    /// Payload parsed but a score was out of range
    #[error(transparent)]
    OutOfRange(#[from] MetricsRangeError),
}

/// A verification call failed (the section keeps no verification result).
#[derive(Debug, Clone, thiserror::Error)]
#[error("verification failed: {0}")]
pub struct VerificationError(pub String);

/// A chat call failed (converted into a transcript entry, never fatal).
#[derive(Debug, Clone, thiserror::Error)]
#[error("chat error: {0}")]
pub struct ChatError(pub String);

//! Clinsight LLM - Provider Abstraction Layer
//!
//! Provider-agnostic traits for the hosted-LLM calls the report pipeline
//! consumes. This crate defines the interfaces; actual provider clients are
//! supplied by the application (and by scripted fakes in tests).
//!
//! # Core Concepts
//!
//! - [`LensGenerator`]: streamed per-lens report generation, aggregate
//!   metrics, and clinical change detection
//! - [`Verifier`]: cross-checks generated text against source data
//! - [`ChatProvider`] / [`ChatSession`]: the conversational side-channel
//!   seeded with patient data
//!
//! Transport-level concerns (retries, backoff, authentication) belong to the
//! provider implementation, not to these interfaces.

#![warn(unreachable_pub)]

mod error;

pub use error::{ChatError, GenerationError, MetricsError, VerificationError};

use async_trait::async_trait;
use clinsight_core::{AnalysisLens, ClinicalMetrics, VerificationResult};
use futures::stream::BoxStream;

/// A stream of generated text chunks for one report section.
///
/// Chunks arrive in order; the accumulated concatenation is the section
/// text. A mid-stream error terminates the section.
pub type SectionStream = BoxStream<'static, Result<String, GenerationError>>;

/// Trait for report-generation providers.
/// Implementations must be thread-safe (Send + Sync).
///
/// # Example
/// ```ignore
/// struct HostedGenerator { /* ... */ }
///
/// #[async_trait]
/// impl LensGenerator for HostedGenerator {
///     async fn generate_report_stream(
///         &self,
///         patient_data: &str,
///         lens: AnalysisLens,
///         system_instruction: &str,
///     ) -> Result<SectionStream, GenerationError> {
///         // Open a streaming completion against the hosted API
///     }
///     // ...
/// }
/// ```
#[async_trait]
pub trait LensGenerator: Send + Sync {
    /// Open a streamed generation call for one lens.
    ///
    /// # Arguments
    /// * `patient_data` - Raw patient text the section must be grounded in
    /// * `lens` - Which report section to generate
    /// * `system_instruction` - The lens's immutable instruction template
    ///
    /// # Returns
    /// * `Ok(SectionStream)` - Ordered text chunks
    /// * `Err(GenerationError)` - If the call cannot be opened
    async fn generate_report_stream(
        &self,
        patient_data: &str,
        lens: AnalysisLens,
        system_instruction: &str,
    ) -> Result<SectionStream, GenerationError>;

    /// Compute aggregate metrics over a full report text.
    ///
    /// Implementations must reject non-conforming provider payloads with
    /// [`MetricsError::Malformed`]; range validation is repeated by the
    /// caller regardless.
    async fn generate_metrics(&self, report_text: &str)
        -> Result<ClinicalMetrics, MetricsError>;

    /// Judge whether the difference between two patient-data snapshots is
    /// clinically significant.
    ///
    /// # Returns
    /// * `Ok(true)` - The change warrants regenerating the report
    /// * `Ok(false)` - The delta is not significant
    async fn detect_clinical_changes(
        &self,
        previous: &str,
        current: &str,
    ) -> Result<bool, GenerationError>;
}

/// Trait for section verifiers.
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Verifier: Send + Sync {
    /// Cross-check one section's text against the source patient data.
    async fn verify_section(
        &self,
        lens: AnalysisLens,
        content: &str,
        source_data: &str,
    ) -> Result<VerificationResult, VerificationError>;
}

/// Trait for conversational providers backing the chat side-channel.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Start a session seeded with patient data and a persona instruction.
    async fn start_session(
        &self,
        patient_data: &str,
        persona: &str,
    ) -> Result<Box<dyn ChatSession>, ChatError>;
}

/// One live conversational session.
#[async_trait]
pub trait ChatSession: Send {
    /// Produce the opening assistant message for the session.
    async fn greeting(&mut self) -> Result<String, ChatError>;

    /// Send a user turn and return the assistant reply.
    async fn send(&mut self, message: &str) -> Result<String, ChatError>;
}

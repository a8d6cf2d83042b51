//! Observable pipeline progress
//!
//! Each lens moves through an explicit state machine rather than an implicit
//! sequential loop, which keeps the "independent failure, joint completion
//! gate" invariant visible and makes later parallelization a local change.

use clinsight_core::{AnalysisLens, ClinicalMetrics, VerificationResult};
use std::collections::BTreeMap;

/// Where one lens currently is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LensState {
    /// Not yet processed
    Pending,
    /// Served from the cache
    CachedHit,
    /// Chunks arriving from the generator
    Streaming,
    /// Final text persisted to the cache
    Persisted,
    /// Verification call in flight
    VerifyPending,
    /// Verification completed
    Verified,
    /// Generation failed; text holds the placeholder section
    Failed,
}

/// Progress for one lens.
#[derive(Debug, Clone, PartialEq)]
pub struct LensProgress {
    /// Current pipeline state
    pub state: LensState,
    /// Accumulated text so far (partial while streaming, final afterwards)
    pub text: String,
    /// Verification outcome, if the check ran
    pub verification: Option<VerificationResult>,
}

impl LensProgress {
    fn pending() -> Self {
        Self {
            state: LensState::Pending,
            text: String::new(),
            verification: None,
        }
    }
}

/// Snapshot of the whole pipeline, published after every state change.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportProgress {
    /// Per-lens progress, in pipeline order
    pub lenses: BTreeMap<AnalysisLens, LensProgress>,
    /// Aggregate metrics once computed
    pub metrics: Option<ClinicalMetrics>,
    /// Whether a run is in flight
    pub loading: bool,
    /// Pipeline-level error, if the run failed outside per-lens isolation
    pub error: Option<String>,
}

impl ReportProgress {
    /// Idle progress: all lenses pending, nothing loading.
    #[must_use]
    pub fn idle() -> Self {
        Self {
            lenses: AnalysisLens::ALL
                .into_iter()
                .map(|lens| (lens, LensProgress::pending()))
                .collect(),
            metrics: None,
            loading: false,
            error: None,
        }
    }

    /// Fresh progress for the start of a run.
    #[must_use]
    pub fn loading() -> Self {
        Self {
            loading: true,
            ..Self::idle()
        }
    }
}

impl Default for ReportProgress {
    fn default() -> Self {
        Self::idle()
    }
}

//! Clinsight Report
//!
//! The multi-stage report orchestrator. For each of the four analysis
//! lenses it checks the encrypted content-addressed cache, streams a fresh
//! generation on miss, persists the result, triggers best-effort
//! verification, aggregates metrics, and writes a master snapshot.
//!
//! # Failure containment
//!
//! Failures are isolated at the smallest meaningful unit: one lens, one
//! verification, one metrics computation. A failed lens yields a placeholder
//! section and the pipeline continues; a partial report always beats no
//! report. Only failures outside the per-lens boundary surface as
//! [`PipelineError`].
//!
//! # Observability
//!
//! Intermediate state (per-lens text while streaming, loading and error
//! flags, verification outcomes) is published through a watch channel; see
//! [`ReportOrchestrator::subscribe`].

#![warn(unreachable_pub)]

mod chat;
mod error;
mod orchestrator;
mod progress;

pub use chat::{ChatHandle, ChatRole, ChatTurn, CHAT_PERSONA};
pub use error::PipelineError;
pub use orchestrator::{
    ReportOrchestrator, FAILED_SECTION_PLACEHOLDER, MASTER_SNAPSHOT_VERSION, METRICS_VERSION,
};
pub use progress::{LensProgress, LensState, ReportProgress};

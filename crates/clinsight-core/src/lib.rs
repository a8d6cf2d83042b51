//! Clinsight Core
//!
//! Shared domain types for the clinical-report pipeline.
//!
//! # Core Concepts
//!
//! - [`AnalysisLens`]: the four fixed report sections, each with an immutable
//!   system-instruction template
//! - [`ClinicalMetrics`]: aggregate complexity/stability/certainty scores
//! - [`VerificationResult`]: outcome of cross-checking a section against
//!   source data
//! - [`CachedValue`]: the closed set of payloads the report cache may hold
//! - [`ReportSnapshot`]: the archival envelope persisted after a full run

#![warn(unreachable_pub)]

mod lens;
mod metrics;
mod value;
mod verification;

pub use lens::AnalysisLens;
pub use metrics::{ClinicalMetrics, MetricsRangeError};
pub use value::{CachedValue, ReportSnapshot};
pub use verification::{
    IssueSeverity, VerificationIssue, VerificationResult, VerificationStatus,
};

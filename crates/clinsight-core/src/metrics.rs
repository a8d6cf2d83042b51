//! Aggregate clinical metrics
//!
//! Three scores computed over the full report text. Providers return them as
//! free-form JSON, so range validation happens on our side before anything is
//! cached or displayed.

use serde::{Deserialize, Serialize};

/// Inclusive bounds for each metric score.
const SCORE_MIN: f64 = 0.0;
const SCORE_MAX: f64 = 10.0;

/// Aggregate metrics over a full report.
///
/// Each score lives in `[0, 10]`. Use [`ClinicalMetrics::validate`] on any
/// value that crossed a trust boundary (provider response, cache read).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClinicalMetrics {
    /// Case complexity score
    pub complexity: f64,
    /// Clinical stability score
    pub stability: f64,
    /// Diagnostic certainty score
    pub certainty: f64,
}

impl ClinicalMetrics {
    /// Create metrics from raw scores.
    #[inline]
    #[must_use]
    pub const fn new(complexity: f64, stability: f64, certainty: f64) -> Self {
        Self {
            complexity,
            stability,
            certainty,
        }
    }

    /// The neutral fallback used when metrics generation fails.
    #[inline]
    #[must_use]
    pub const fn neutral() -> Self {
        Self::new(5.0, 5.0, 5.0)
    }

    /// Validate that every score is finite and within `[0, 10]`.
    ///
    /// # Errors
    /// Returns the first out-of-range field.
    pub fn validate(&self) -> Result<(), MetricsRangeError> {
        for (field, value) in [
            ("complexity", self.complexity),
            ("stability", self.stability),
            ("certainty", self.certainty),
        ] {
            if !value.is_finite() || !(SCORE_MIN..=SCORE_MAX).contains(&value) {
                return Err(MetricsRangeError { field, value });
            }
        }
        Ok(())
    }
}

/// A metric score outside the allowed `[0, 10]` range.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("metric {field} out of range: {value} (expected 0..=10)")]
pub struct MetricsRangeError {
    /// Which score was out of range
    pub field: &'static str,
    /// The offending value
    pub value: f64,
}

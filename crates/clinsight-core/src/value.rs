//! Cacheable payloads
//!
//! The report cache persists a closed set of payload shapes rather than open
//! JSON: section text, validated metrics, and the master snapshot envelope.
//! The adjacent `kind`/`payload` tagging makes every persisted record
//! self-describing, so a read that decodes to the wrong shape is detected
//! instead of silently misinterpreted.

use crate::{AnalysisLens, ClinicalMetrics};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Archival envelope persisted after a full successful report run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSnapshot {
    /// Final text per lens, in pipeline order
    pub sections: BTreeMap<AnalysisLens, String>,
    /// Aggregate metrics for the full report
    pub metrics: ClinicalMetrics,
    /// When the snapshot was taken
    pub created_at: DateTime<Utc>,
}

impl ReportSnapshot {
    /// Create a snapshot timestamped now.
    #[must_use]
    pub fn new(sections: BTreeMap<AnalysisLens, String>, metrics: ClinicalMetrics) -> Self {
        Self {
            sections,
            metrics,
            created_at: Utc::now(),
        }
    }
}

/// A value the report cache can hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum CachedValue {
    /// A generated section (or full report) as text
    Text(String),
    /// Validated aggregate metrics
    Metrics(ClinicalMetrics),
    /// Master snapshot envelope
    Snapshot(ReportSnapshot),
}

impl CachedValue {
    /// Borrow the text payload, if this is a [`CachedValue::Text`].
    #[inline]
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CachedValue::Text(t) => Some(t),
            _ => None,
        }
    }

    /// Copy out the metrics payload, if this is a [`CachedValue::Metrics`].
    #[inline]
    #[must_use]
    pub fn as_metrics(&self) -> Option<ClinicalMetrics> {
        match self {
            CachedValue::Metrics(m) => Some(*m),
            _ => None,
        }
    }

    /// Borrow the snapshot payload, if this is a [`CachedValue::Snapshot`].
    #[inline]
    #[must_use]
    pub fn as_snapshot(&self) -> Option<&ReportSnapshot> {
        match self {
            CachedValue::Snapshot(s) => Some(s),
            _ => None,
        }
    }
}

impl From<String> for CachedValue {
    fn from(text: String) -> Self {
        CachedValue::Text(text)
    }
}

impl From<ClinicalMetrics> for CachedValue {
    fn from(metrics: ClinicalMetrics) -> Self {
        CachedValue::Metrics(metrics)
    }
}

impl From<ReportSnapshot> for CachedValue {
    fn from(snapshot: ReportSnapshot) -> Self {
        CachedValue::Snapshot(snapshot)
    }
}

//! The fixed set of analysis lenses
//!
//! A lens is one section of the comprehensive report. The set is closed and
//! the pipeline order is fixed: lenses are generated strictly in the order of
//! [`AnalysisLens::ALL`]. Each lens maps 1:1 to an immutable system
//! instruction used for both generation and cache-key derivation.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// One section of the comprehensive clinical report.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum AnalysisLens {
    /// High-level care plan summary
    CarePlanOverview,
    /// Functional and rehabilitation protocols
    FunctionalProtocols,
    /// Monitoring cadence and follow-up triggers
    MonitoringFollowUp,
    /// Plain-language patient education material
    PatientEducation,
}

impl AnalysisLens {
    /// All lenses, in pipeline order.
    pub const ALL: [AnalysisLens; 4] = [
        AnalysisLens::CarePlanOverview,
        AnalysisLens::FunctionalProtocols,
        AnalysisLens::MonitoringFollowUp,
        AnalysisLens::PatientEducation,
    ];

    /// Human-readable section title.
    #[inline]
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            AnalysisLens::CarePlanOverview => "Care Plan Overview",
            AnalysisLens::FunctionalProtocols => "Functional Protocols",
            AnalysisLens::MonitoringFollowUp => "Monitoring & Follow-up",
            AnalysisLens::PatientEducation => "Patient Education",
        }
    }

    /// System instruction template for this lens.
    ///
    /// The mapping is immutable process-wide configuration; the instruction
    /// text participates in cache-key derivation, so editing it invalidates
    /// previously cached sections for the lens.
    #[must_use]
    pub const fn system_instruction(self) -> &'static str {
        match self {
            AnalysisLens::CarePlanOverview => {
                "You are a senior clinician writing the Care Plan Overview section of a \
                 patient report. Summarize the presenting condition, active diagnoses, \
                 and the overall treatment strategy. Ground every statement in the \
                 provided patient data and do not invent findings."
            }
            AnalysisLens::FunctionalProtocols => {
                "You are a rehabilitation specialist writing the Functional Protocols \
                 section of a patient report. Describe concrete functional and \
                 therapeutic protocols appropriate to the patient data, including \
                 frequency and progression criteria. Do not invent findings."
            }
            AnalysisLens::MonitoringFollowUp => {
                "You are a clinician writing the Monitoring & Follow-up section of a \
                 patient report. Specify what should be monitored, at what cadence, \
                 and which changes in the patient data would trigger escalation. \
                 Do not invent findings."
            }
            AnalysisLens::PatientEducation => {
                "You are writing the Patient Education section of a clinical report. \
                 Explain the condition and care plan in plain language a patient can \
                 act on, based strictly on the provided patient data."
            }
        }
    }
}

impl Display for AnalysisLens {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

//! Section verification types
//!
//! The verifier cross-checks generated section text against the source
//! patient data and reports a status plus an ordered list of issues.
//! Verification is best-effort: a missing result means the check could not
//! run, not that the section is wrong.

use serde::{Deserialize, Serialize};

/// Overall verification outcome for a section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    /// All claims grounded in the source data
    Verified,
    /// Minor discrepancies worth a look
    Warning,
    /// Material claims not supported by the source data
    Error,
}

/// Severity of an individual verification issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    /// Informational note
    Info,
    /// Should be reviewed
    Warning,
    /// Must be corrected before use
    Critical,
}

/// One discrepancy found while verifying a section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationIssue {
    /// Issue severity
    pub severity: IssueSeverity,
    /// Human-readable description
    pub message: String,
    /// Optional corrected wording
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_fix: Option<String>,
    /// The specific claim in the section text this issue refers to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim: Option<String>,
}

impl VerificationIssue {
    /// Create a new issue.
    #[inline]
    #[must_use]
    pub fn new(severity: IssueSeverity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            suggested_fix: None,
            claim: None,
        }
    }

    /// Attach a suggested fix.
    #[inline]
    #[must_use]
    pub fn with_fix(mut self, fix: impl Into<String>) -> Self {
        self.suggested_fix = Some(fix.into());
        self
    }

    /// Attach the claim the issue refers to.
    #[inline]
    #[must_use]
    pub fn with_claim(mut self, claim: impl Into<String>) -> Self {
        self.claim = Some(claim.into());
        self
    }
}

/// Result of verifying one section. Issue order is preserved as reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    /// Overall status
    pub status: VerificationStatus,
    /// Ordered list of issues (may be empty for `Verified`)
    pub issues: Vec<VerificationIssue>,
}

impl VerificationResult {
    /// A clean result with no issues.
    #[inline]
    #[must_use]
    pub const fn verified() -> Self {
        Self {
            status: VerificationStatus::Verified,
            issues: Vec::new(),
        }
    }

    /// Create a result with the given status and issues.
    #[inline]
    #[must_use]
    pub fn new(status: VerificationStatus, issues: Vec<VerificationIssue>) -> Self {
        Self { status, issues }
    }
}

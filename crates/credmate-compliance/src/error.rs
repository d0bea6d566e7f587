//! Evaluation errors.
//!
//! Only conditions that make a snapshot meaningless are errors. Anything
//! the evaluator can work around (a cycle start that predates the
//! jurisdiction's first rule version, an as-of date before any version took
//! effect) produces a degraded snapshot with an advisory instead.

use chrono::NaiveDate;
use credmate_core::{CanonicalizationError, JurisdictionId, ValidationError};
use thiserror::Error;

/// Errors raised by [`crate::Evaluator::evaluate`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvaluationError {
    /// The jurisdiction has never published a rule version.
    #[error("{jurisdiction} has no published rule version to evaluate against as of {as_of}")]
    NoEffectiveRuleVersion {
        /// The jurisdiction.
        jurisdiction: JurisdictionId,
        /// The requested evaluation date.
        as_of: NaiveDate,
    },

    /// The rule history belongs to a different jurisdiction than the license.
    #[error("rules for {rules} were supplied for a license issued by {license}")]
    JurisdictionMismatch {
        /// Jurisdiction of the rule history.
        rules: JurisdictionId,
        /// Jurisdiction of the license.
        license: JurisdictionId,
    },

    /// A cycle boundary could not be represented.
    #[error("cycle window could not be computed: {0}")]
    Window(#[from] ValidationError),

    /// The snapshot body could not be canonicalized for its digest.
    #[error("snapshot digest failed: {0}")]
    Digest(String),
}

impl From<CanonicalizationError> for EvaluationError {
    fn from(err: CanonicalizationError) -> Self {
        Self::Digest(err.to_string())
    }
}

impl EvaluationError {
    /// Machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoEffectiveRuleVersion { .. } => "NO_EFFECTIVE_RULE_VERSION",
            Self::JurisdictionMismatch { .. } => "JURISDICTION_MISMATCH",
            Self::Window(_) => "CYCLE_WINDOW_OUT_OF_RANGE",
            Self::Digest(_) => "SNAPSHOT_DIGEST_FAILED",
        }
    }
}

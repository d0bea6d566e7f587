//! Monitor error types.

use credmate_compliance::EvaluationError;
use credmate_core::LicenseId;
use credmate_ledger::LedgerError;
use credmate_rules::RuleStoreError;
use thiserror::Error;

/// Errors raised while orchestrating evaluations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MonitorError {
    /// A rule store lookup failed.
    #[error("rule store: {0}")]
    Rules(#[from] RuleStoreError),

    /// A ledger lookup failed.
    #[error("ledger: {0}")]
    Ledger(#[from] LedgerError),

    /// The evaluator rejected its input.
    #[error("evaluation: {0}")]
    Evaluation(#[from] EvaluationError),

    /// One license's evaluation exceeded its time budget.
    #[error("evaluation of license {license} timed out after {after_ms} ms")]
    Timeout {
        /// The license.
        license: LicenseId,
        /// The budget in milliseconds.
        after_ms: u64,
    },

    /// The evaluation task panicked or was cancelled.
    #[error("evaluation task failed: {0}")]
    TaskFailed(String),

    /// A dependency was temporarily unavailable.
    #[error("transient failure: {0}")]
    Transient(String),

    /// The snapshot history rejected an entry.
    #[error("snapshot history: {0}")]
    History(String),
}

impl MonitorError {
    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::TaskFailed(_) | Self::Transient(_)
        )
    }

    /// Machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Rules(e) => e.kind(),
            Self::Ledger(e) => e.kind(),
            Self::Evaluation(e) => e.kind(),
            Self::Timeout { .. } => "EVALUATION_TIMEOUT",
            Self::TaskFailed(_) => "EVALUATION_TASK_FAILED",
            Self::Transient(_) => "TRANSIENT",
            Self::History(_) => "HISTORY",
        }
    }
}

//! Ledger error types.
//!
//! Each rejection carries two things: a machine-readable [`kind`] for
//! programmatic handling, and a `Display` message that explains to a
//! physician or administrator what went wrong and what to do about it.
//!
//! [`kind`]: LedgerError::kind

use chrono::NaiveDate;
use credmate_core::{ActivityId, AuditRequestId, CreditType, JurisdictionId, LicenseId};
use thiserror::Error;

use crate::license::LicenseStatus;

/// Errors raised by [`crate::CredentialLedger`] operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// No license with this identifier.
    #[error("license {0} was not found")]
    LicenseNotFound(LicenseId),

    /// No activity with this identifier.
    #[error("activity {0} was not found")]
    ActivityNotFound(ActivityId),

    /// No active claim joins this activity and license.
    #[error("activity {activity} is not currently claimed for license {license}")]
    ClaimNotFound {
        /// The activity.
        activity: ActivityId,
        /// The license.
        license: LicenseId,
    },

    /// The jurisdiction already has a license with this number.
    #[error("license number {number} is already registered in {jurisdiction}")]
    DuplicateLicense {
        /// The jurisdiction.
        jurisdiction: JurisdictionId,
        /// The duplicated number.
        number: String,
    },

    /// The license definition is inconsistent.
    #[error("invalid license: {0}")]
    InvalidLicense(String),

    /// The activity record is inconsistent.
    #[error("invalid activity: {0}")]
    InvalidActivity(String),

    /// The activity is dated after the day it was recorded.
    #[error("activity completion date {completion_date} is in the future (today is {today}); record it once it is completed")]
    FutureCompletionDate {
        /// The claimed completion date.
        completion_date: NaiveDate,
        /// The ledger's current date.
        today: NaiveDate,
    },

    /// The license's jurisdiction does not accept the activity's credit type.
    #[error("{jurisdiction} does not accept {credit_type} credit under rule version {rule_version}; this activity cannot count toward the license")]
    UnacceptedCreditType {
        /// The activity's credit type.
        credit_type: CreditType,
        /// The license's jurisdiction.
        jurisdiction: JurisdictionId,
        /// The rule version consulted.
        rule_version: String,
    },

    /// The activity and license belong to different licensees.
    #[error("activity {activity} belongs to a different licensee than license {license}")]
    LicenseeMismatch {
        /// The activity.
        activity: ActivityId,
        /// The license.
        license: LicenseId,
    },

    /// The activity was completed before the license existed.
    #[error("activity completed on {completion_date} predates license issue date {issue_date}, so it falls outside every cycle of this license")]
    ActivityOutsideCycle {
        /// The activity's completion date.
        completion_date: NaiveDate,
        /// The license's issue date.
        issue_date: NaiveDate,
    },

    /// The activity was replaced by a correction.
    #[error("activity {activity} was superseded by correction {superseded_by}; claim or correct the newer record instead")]
    ActivitySuperseded {
        /// The superseded activity.
        activity: ActivityId,
        /// Its replacement.
        superseded_by: ActivityId,
    },

    /// Rules for one jurisdiction were supplied for a license in another.
    #[error("rule version for {rules} cannot be applied to a license in {license}")]
    JurisdictionMismatch {
        /// Jurisdiction of the supplied rules.
        rules: JurisdictionId,
        /// Jurisdiction of the license.
        license: JurisdictionId,
    },

    /// A renewal must move the cycle start forward.
    #[error("renewal cycle start {requested} must be after the current cycle start {current}")]
    RenewalNotAdvancing {
        /// The current cycle start.
        current: NaiveDate,
        /// The requested new cycle start.
        requested: NaiveDate,
    },

    /// The license is revoked and cannot change further.
    #[error("license {0} is revoked; no further changes are possible")]
    LicenseRevoked(LicenseId),

    /// The status change is not a legal lifecycle transition.
    #[error("license status cannot change from {from} to {to}")]
    InvalidStatusTransition {
        /// Current status.
        from: LicenseStatus,
        /// Requested status.
        to: LicenseStatus,
    },

    /// No board audit with this identifier on the license.
    #[error("board audit {0} was not found")]
    AuditNotFound(AuditRequestId),

    /// The audit response was already recorded.
    #[error("board audit {0} already has a recorded response")]
    AuditAlreadyResponded(AuditRequestId),
}

impl LedgerError {
    /// Machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::LicenseNotFound(_) => "LICENSE_NOT_FOUND",
            Self::ActivityNotFound(_) => "ACTIVITY_NOT_FOUND",
            Self::ClaimNotFound { .. } => "CLAIM_NOT_FOUND",
            Self::DuplicateLicense { .. } => "DUPLICATE_LICENSE",
            Self::InvalidLicense(_) => "INVALID_LICENSE",
            Self::InvalidActivity(_) => "INVALID_ACTIVITY",
            Self::FutureCompletionDate { .. } => "FUTURE_COMPLETION_DATE",
            Self::UnacceptedCreditType { .. } => "UNACCEPTED_CREDIT_TYPE",
            Self::LicenseeMismatch { .. } => "LICENSEE_MISMATCH",
            Self::ActivityOutsideCycle { .. } => "ACTIVITY_OUTSIDE_CYCLE",
            Self::ActivitySuperseded { .. } => "ACTIVITY_SUPERSEDED",
            Self::JurisdictionMismatch { .. } => "JURISDICTION_MISMATCH",
            Self::RenewalNotAdvancing { .. } => "RENEWAL_NOT_ADVANCING",
            Self::LicenseRevoked(_) => "LICENSE_REVOKED",
            Self::InvalidStatusTransition { .. } => "INVALID_STATUS_TRANSITION",
            Self::AuditNotFound(_) => "AUDIT_NOT_FOUND",
            Self::AuditAlreadyResponded(_) => "AUDIT_ALREADY_RESPONDED",
        }
    }

    /// Whether the error is a missing-resource lookup failure.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::LicenseNotFound(_)
                | Self::ActivityNotFound(_)
                | Self::ClaimNotFound { .. }
                | Self::AuditNotFound(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_and_message_differ() {
        let err = LedgerError::UnacceptedCreditType {
            credit_type: CreditType::new("AOA_1A").unwrap(),
            jurisdiction: JurisdictionId::new("US-TX").unwrap(),
            rule_version: "US-TX/v1".into(),
        };
        assert_eq!(err.kind(), "UNACCEPTED_CREDIT_TYPE");
        let message = err.to_string();
        assert!(message.contains("AOA_1A"));
        assert!(message.contains("US-TX/v1"));
        assert_ne!(message, err.kind());
    }

    #[test]
    fn outside_cycle_explains_dates() {
        let err = LedgerError::ActivityOutsideCycle {
            completion_date: NaiveDate::from_ymd_opt(2019, 5, 1).unwrap(),
            issue_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
        };
        assert!(err.to_string().contains("2019-05-01"));
        assert!(err.to_string().contains("2020-01-01"));
    }

    #[test]
    fn not_found_classification() {
        assert!(LedgerError::LicenseNotFound(LicenseId::new()).is_not_found());
        assert!(!LedgerError::LicenseRevoked(LicenseId::new()).is_not_found());
    }
}

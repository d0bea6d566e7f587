//! Rule store and rulepack error types.
//!
//! Every variant maps to a configuration-class failure: the operation is
//! rejected and nothing is written. [`RuleStoreError::kind`] gives the
//! machine-readable code the API layer returns alongside the human message.

use std::path::PathBuf;

use chrono::NaiveDate;
use credmate_core::JurisdictionId;
use thiserror::Error;

/// Errors raised by [`crate::RuleStore`] operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuleStoreError {
    /// The jurisdiction has not been registered.
    #[error("jurisdiction {0} is not registered")]
    UnknownJurisdiction(JurisdictionId),

    /// A different definition is already registered under this id.
    #[error("jurisdiction {jurisdiction} is already registered with a different definition")]
    JurisdictionConflict {
        /// The contested identifier.
        jurisdiction: JurisdictionId,
    },

    /// The new version would not be strictly later than the latest one.
    #[error(
        "rule version for {jurisdiction} effective {effective_from} overlaps the latest version effective {latest}; new versions must start strictly after it"
    )]
    OverlappingEffectiveRange {
        /// The jurisdiction being published to.
        jurisdiction: JurisdictionId,
        /// The rejected effective date.
        effective_from: NaiveDate,
        /// The latest existing effective date.
        latest: NaiveDate,
    },

    /// The rule body failed validation.
    #[error("invalid rule version for {jurisdiction}: {reason}")]
    InvalidRuleVersion {
        /// The jurisdiction being published to.
        jurisdiction: JurisdictionId,
        /// What was wrong.
        reason: String,
    },

    /// The jurisdiction has never published a rule version.
    #[error("jurisdiction {0} has no published rule versions")]
    NoVersionsPublished(JurisdictionId),

    /// No version is effective on the requested date (it precedes the
    /// earliest version).
    #[error("no rule version for {jurisdiction} is effective on {as_of}")]
    NoEffectiveVersion {
        /// The jurisdiction queried.
        jurisdiction: JurisdictionId,
        /// The date queried.
        as_of: NaiveDate,
    },

    /// A restored version arrived out of order during hydration.
    #[error("cannot restore {version}: expected sequence {expected}")]
    RestoreOutOfOrder {
        /// The version being restored.
        version: String,
        /// The sequence number the store expected next.
        expected: u32,
    },

    /// Digest computation failed.
    #[error("canonicalization error: {0}")]
    Canonicalization(String),
}

impl RuleStoreError {
    /// Machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownJurisdiction(_) => "UNKNOWN_JURISDICTION",
            Self::JurisdictionConflict { .. } => "JURISDICTION_CONFLICT",
            Self::OverlappingEffectiveRange { .. } => "OVERLAPPING_EFFECTIVE_RANGE",
            Self::InvalidRuleVersion { .. } => "INVALID_RULE_VERSION",
            Self::NoVersionsPublished(_) => "NO_EFFECTIVE_RULE_VERSION",
            Self::NoEffectiveVersion { .. } => "NO_EFFECTIVE_RULE_VERSION",
            Self::RestoreOutOfOrder { .. } => "RESTORE_OUT_OF_ORDER",
            Self::Canonicalization(_) => "CANONICALIZATION_ERROR",
        }
    }
}

impl From<credmate_core::CanonicalizationError> for RuleStoreError {
    fn from(err: credmate_core::CanonicalizationError) -> Self {
        Self::Canonicalization(err.to_string())
    }
}

/// Errors raised while loading or installing a rulepack.
#[derive(Debug, Error)]
pub enum RulepackError {
    /// YAML parsing failed.
    #[error("failed to parse rulepack YAML at {path}: {source}")]
    YamlParse {
        /// The file being parsed.
        path: PathBuf,
        /// The underlying parser error.
        source: serde_yaml::Error,
    },

    /// The file or directory does not exist.
    #[error("rulepack not found: {path}")]
    FileNotFound {
        /// The missing path.
        path: PathBuf,
    },

    /// The pack parsed but is internally inconsistent.
    #[error("invalid rulepack {name}: {detail}")]
    Invalid {
        /// The pack name.
        name: String,
        /// What was wrong.
        detail: String,
    },

    /// Installing into the store failed.
    #[error("rulepack {name} could not be installed: {source}")]
    Install {
        /// The pack name.
        name: String,
        /// The store rejection.
        source: RuleStoreError,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias for rulepack operations.
pub type RulepackResult<T> = Result<T, RulepackError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn jid() -> JurisdictionId {
        JurisdictionId::new("US-TX").unwrap()
    }

    #[test]
    fn overlap_message_names_both_dates() {
        let err = RuleStoreError::OverlappingEffectiveRange {
            jurisdiction: jid(),
            effective_from: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            latest: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        };
        let msg = err.to_string();
        assert!(msg.contains("2024-01-01"));
        assert!(msg.contains("2025-01-01"));
        assert_eq!(err.kind(), "OVERLAPPING_EFFECTIVE_RANGE");
    }

    #[test]
    fn missing_versions_share_kind() {
        let a = RuleStoreError::NoVersionsPublished(jid());
        let b = RuleStoreError::NoEffectiveVersion {
            jurisdiction: jid(),
            as_of: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
        };
        assert_eq!(a.kind(), b.kind());
        assert_ne!(a.to_string(), b.to_string());
    }

    #[test]
    fn rulepack_not_found_names_path() {
        let err = RulepackError::FileNotFound {
            path: PathBuf::from("/nope/pack.yaml"),
        };
        assert!(err.to_string().contains("/nope/pack.yaml"));
    }
}

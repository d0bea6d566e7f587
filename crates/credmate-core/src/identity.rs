//! # Identity Newtypes
//!
//! Domain-primitive newtypes for identifiers throughout the engine. Each
//! identifier is a distinct type; you cannot pass a [`ClaimId`] where an
//! [`ActivityId`] is expected.
//!
//! ## Validation
//!
//! UUID-based identifiers ([`LicenseId`], [`LicenseeId`], [`ActivityId`],
//! [`ClaimId`], [`AuditRequestId`]) are always valid by construction.
//!
//! String-based identifiers ([`CreditType`], [`Topic`], [`LicenseNumber`],
//! [`ProviderId`]) validate at construction time and during
//! deserialization (`serde(try_from = "String")`), so a malformed rulepack
//! or request body is rejected before it reaches a store.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

// ---------------------------------------------------------------------------
// UUID-based identifiers (always valid by construction)
// ---------------------------------------------------------------------------

macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Create an identifier from an existing UUID.
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Access the underlying UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

uuid_identifier!(
    /// A license held by a licensee in one jurisdiction.
    LicenseId
);

uuid_identifier!(
    /// A licensed professional (physician). Account data lives elsewhere;
    /// the engine only needs a stable key.
    LicenseeId
);

uuid_identifier!(
    /// A recorded CME activity. Corrections create a new `ActivityId` that
    /// supersedes the original.
    ActivityId
);

uuid_identifier!(
    /// A claim joining one activity to one license.
    ClaimId
);

uuid_identifier!(
    /// A board-initiated CME audit on a license.
    AuditRequestId
);

// ---------------------------------------------------------------------------
// String-based identifiers (validated at construction)
// ---------------------------------------------------------------------------

fn is_code_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// A credit-type designator, e.g. `AMA_PRA_1`, `AOA_1A`, `AAFP_PRESCRIBED`.
///
/// Normalized to ASCII uppercase so `ama_pra_1` and `AMA_PRA_1` compare equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CreditType(String);

impl CreditType {
    /// Create a credit type, validating and normalizing it.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidCreditType`] if the value is empty,
    /// longer than 64 characters, or contains characters other than ASCII
    /// letters, digits, `_` and `-`.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = value.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.len() > 64 || !trimmed.chars().all(is_code_char) {
            return Err(ValidationError::InvalidCreditType(raw));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    /// Access the normalized string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CreditType {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CreditType> for String {
    fn from(value: CreditType) -> Self {
        value.0
    }
}

impl std::fmt::Display for CreditType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A topic tag on an activity or quota, e.g. `ethics`, `opioid_prescribing`.
///
/// Normalized to ASCII lowercase with spaces folded to `_`, so
/// `"Pain Management"` and `"pain_management"` name the same topic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Topic(String);

impl Topic {
    /// Create a topic tag, validating and normalizing it.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidTopic`] if the normalized value is
    /// empty, longer than 64 characters, or has characters outside
    /// `[a-z0-9_-]`.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = value.into();
        let normalized: String = raw
            .trim()
            .chars()
            .map(|c| if c == ' ' { '_' } else { c.to_ascii_lowercase() })
            .collect();
        if normalized.is_empty() || normalized.len() > 64 || !normalized.chars().all(is_code_char)
        {
            return Err(ValidationError::InvalidTopic(raw));
        }
        Ok(Self(normalized))
    }

    /// Access the normalized string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Topic {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Topic> for String {
    fn from(value: Topic) -> Self {
        value.0
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A board-issued license number. Opaque apart from length limits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LicenseNumber(String);

impl LicenseNumber {
    /// Create a license number.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidLicenseNumber`] if empty after
    /// trimming, longer than 64 characters, or containing control characters.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = value.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.len() > 64 || trimmed.chars().any(char::is_control) {
            return Err(ValidationError::InvalidLicenseNumber(raw));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Access the license number.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for LicenseNumber {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<LicenseNumber> for String {
    fn from(value: LicenseNumber) -> Self {
        value.0
    }
}

impl std::fmt::Display for LicenseNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An accredited CME provider identifier (e.g. an ACCME provider number).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProviderId(String);

impl ProviderId {
    /// Create a provider identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidProviderId`] if empty after
    /// trimming, longer than 128 characters, or containing control characters.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = value.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.len() > 128 || trimmed.chars().any(char::is_control) {
            return Err(ValidationError::InvalidProviderId(raw));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Access the provider identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ProviderId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ProviderId> for String {
    fn from(value: ProviderId) -> Self {
        value.0
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

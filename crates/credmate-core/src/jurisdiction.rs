//! # Jurisdiction Identifier
//!
//! A licensing jurisdiction is named by a short code such as `US-TX` or
//! `US-CA-DO` (a separate osteopathic board). The identifier is the key for
//! rule versions, licenses, and per-jurisdiction write serialization.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Identifier for a licensing jurisdiction.
///
/// Two to sixteen characters drawn from ASCII uppercase letters, digits,
/// and `-`. Lowercase input is normalized to uppercase.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JurisdictionId(String);

impl JurisdictionId {
    /// Create a jurisdiction identifier from a string.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidJurisdictionId`] if the string is
    /// outside 2..=16 characters or contains anything besides letters,
    /// digits and `-`.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = value.into();
        let normalized = raw.trim().to_ascii_uppercase();
        let valid_len = (2..=16).contains(&normalized.len());
        let valid_chars = normalized
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-');
        if !valid_len || !valid_chars || normalized.starts_with('-') || normalized.ends_with('-') {
            return Err(ValidationError::InvalidJurisdictionId(raw));
        }
        Ok(Self(normalized))
    }

    /// Access the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for JurisdictionId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<JurisdictionId> for String {
    fn from(value: JurisdictionId) -> Self {
        value.0
    }
}

impl std::fmt::Display for JurisdictionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for JurisdictionId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

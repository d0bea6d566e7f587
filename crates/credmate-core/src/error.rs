//! # Error Hierarchy
//!
//! Structured error types shared across the engine, built with `thiserror`.
//!
//! Each subsystem crate defines its own error enum for operational failures
//! (rule store conflicts, ledger rejections, evaluation failures). This
//! module holds the primitive-level errors those enums wrap: malformed
//! identifiers, unparseable credit amounts, calendar overflow, and
//! canonicalization failures.

use thiserror::Error;

/// Top-level error type for foundational operations.
#[derive(Error, Debug)]
pub enum CredmateError {
    /// Canonicalization failure during digest computation.
    #[error("canonicalization error: {0}")]
    Canonicalization(#[from] CanonicalizationError),

    /// Domain primitive validation failure.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors during canonical serialization.
#[derive(Error, Debug)]
pub enum CanonicalizationError {
    /// Float values are not permitted in canonical representations.
    /// Credit amounts and weights must be decimal strings.
    #[error("float values are not permitted in canonical representations; use decimal strings for amounts: {0}")]
    FloatRejected(f64),

    /// JSON serialization failed during canonicalization.
    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

/// Validation errors for domain primitive newtypes.
///
/// Each type enforces its format at construction time. The errors carry
/// the rejected input so operators can diagnose a bad rulepack or request
/// without guesswork.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Jurisdiction identifier is empty or malformed.
    #[error("invalid jurisdiction ID: \"{0}\" (expected 2-16 uppercase letters, digits or '-')")]
    InvalidJurisdictionId(String),

    /// Credit type designator is empty or malformed.
    #[error("invalid credit type: \"{0}\" (expected 1-64 letters, digits, '_' or '-')")]
    InvalidCreditType(String),

    /// Topic tag is empty or malformed.
    #[error("invalid topic: \"{0}\" (expected 1-64 lowercase letters, digits, '_' or '-')")]
    InvalidTopic(String),

    /// License number is empty or too long.
    #[error("invalid license number: \"{0}\" (expected 1-64 printable characters)")]
    InvalidLicenseNumber(String),

    /// Provider identifier is empty or too long.
    #[error("invalid provider ID: \"{0}\" (expected 1-128 printable characters)")]
    InvalidProviderId(String),

    /// A credit-hour amount could not be parsed or is out of range.
    #[error("invalid credit hours: \"{value}\" ({reason})")]
    InvalidCreditHours {
        /// The rejected input.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// An equivalence weight could not be parsed or is out of range.
    #[error("invalid weight: \"{value}\" ({reason})")]
    InvalidWeight {
        /// The rejected input.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Calendar arithmetic left chrono's representable range.
    #[error("date {date} plus {months} months is out of range")]
    DateOutOfRange {
        /// The starting date.
        date: chrono::NaiveDate,
        /// The number of months added.
        months: u32,
    },
}

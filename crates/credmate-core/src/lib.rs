#![deny(missing_docs)]

//! # credmate-core: Foundational Types for the CredentialMate Engine
//!
//! This crate defines the types every other crate in the workspace depends
//! on. It has no internal crate dependencies, only `serde`, `serde_json`,
//! `thiserror`, `chrono`, `uuid`, and `sha2` from the external ecosystem.
//!
//! ## Design Principles
//!
//! 1. **Newtype wrappers for domain primitives.** Every identifier is a
//!    distinct type. You cannot pass a [`LicenseId`] where an [`ActivityId`]
//!    is expected.
//!
//! 2. **No floating point in compliance arithmetic.** Credit amounts are
//!    [`CreditHours`] (fixed-point hundredths) and equivalence weights are
//!    [`Weight`] (basis points). Both serialize as decimal strings, so every
//!    snapshot can flow through [`CanonicalBytes`] without float rejection.
//!
//! 3. **[`CanonicalBytes`] is the sole path to digest computation.** Snapshot
//!    identifiers, rule-version digests, and the history hash chain are all
//!    computed from canonical bytes.
//!
//! 4. **[`CredmateError`] hierarchy.** Structured errors with `thiserror`;
//!    no `Box<dyn Error>`, no `.unwrap()` outside tests.

pub mod canonical;
pub mod digest;
pub mod error;
pub mod identity;
pub mod jurisdiction;
pub mod temporal;
pub mod units;

// Re-export primary types at crate root for ergonomic imports.
pub use canonical::CanonicalBytes;
pub use digest::{sha256_digest, sha256_hex, ContentDigest, DigestAlgorithm};
pub use error::{CanonicalizationError, CredmateError, ValidationError};
pub use identity::{
    ActivityId, AuditRequestId, ClaimId, CreditType, LicenseId, LicenseNumber, LicenseeId,
    ProviderId, Topic,
};
pub use jurisdiction::JurisdictionId;
pub use temporal::{add_months, months_until, Clock, FixedClock, SystemClock, Timestamp};
pub use units::{CreditHours, Weight};

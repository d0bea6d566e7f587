//! # credmate-ledger: Credential Ledger
//!
//! The ledger is the licensee's side of compliance: what licenses they hold,
//! what CME they completed, and which license each activity counts toward.
//!
//! - [`License`] carries its cycle start, lifecycle status, renewals,
//!   status transitions, and board audits.
//! - [`CmeActivity`] is a completed activity. It is never edited: a
//!   correction creates a new record that supersedes the old one.
//! - [`Claim`] joins one activity to one license. One activity may count
//!   toward several licenses, and each claim can be withdrawn on its own.
//! - [`StatusObservation`] records what an external verification feed
//!   reported about a license. It is advisory and never changes the
//!   license's own status.
//!
//! Every collection is append-only from the caller's perspective. The only
//! in-place changes are one-time markers: `superseded_by` on an activity,
//! `withdrawn_at` on a claim, `responded_on` on an audit, and the license's
//! current status/cycle, each of which also appends to a history list.

pub mod activity;
pub mod claim;
pub mod error;
pub mod ledger;
pub mod license;
pub mod observation;

pub use activity::{ActivityCorrection, CmeActivity, NewActivity};
pub use claim::Claim;
pub use error::LedgerError;
pub use ledger::CredentialLedger;
pub use license::{BoardAudit, License, LicenseStatus, NewLicense, Renewal, StatusTransition};
pub use observation::StatusObservation;

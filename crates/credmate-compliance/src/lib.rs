//! # credmate-compliance: Compliance Evaluator
//!
//! Turns a license, its claimed CME, and its jurisdiction's rule history
//! into a [`ComplianceSnapshot`] for a given date.
//!
//! The evaluator is a pure function. It performs no I/O, holds no locks,
//! and never consults a clock: the caller supplies `as_of` and the
//! `computed_at` timestamp. Evaluating the same input twice yields the
//! same `snapshot_id`.
//!
//! ## Statuses
//!
//! | Status | When |
//! |---|---|
//! | `compliant` | every requirement met, or the cycle is open and on track |
//! | `at_risk` | cycle open, pace heuristic says the gap will not close (advisory) |
//! | `grace_period` | cycle ended short, practice-allowed grace still open |
//! | `non_compliant` | cycle ended short, no practice-allowed grace remaining |
//!
//! A practice-barred grace window yields `non_compliant` with a
//! [`GraceStanding`] whose `practice_allowed` is `false`, so the cure
//! deadline is still visible.

pub mod error;
pub mod evaluator;
pub mod pace;
pub mod snapshot;
pub mod window;

pub use error::EvaluationError;
pub use evaluator::{EvaluationInput, Evaluator};
pub use pace::{PaceAssessment, PaceConfig};
pub use snapshot::{
    Advisory, AdvisoryKind, ComplianceSnapshot, ComplianceStatus, CycleWindow, ExcludedActivity,
    ExclusionReason, GraceStanding, StatusBasis, TopicProgress, TopicStanding,
};
pub use window::{cycle_window, grace_end, next_nominal_boundary};

//! # credmate-rules: Jurisdiction Rule Store
//!
//! Each licensing jurisdiction publishes CME requirements that change over
//! time: a new topic mandate, a longer cycle, a different grace policy.
//! This crate models those requirements as immutable, effective-dated
//! [`RuleVersion`]s and stores them append-only.
//!
//! - **Model** ([`model`]): [`Jurisdiction`], [`RuleSet`] with its
//!   [`TopicQuota`], [`CreditTypeAcceptance`], [`GracePolicy`] and
//!   [`ProrationRule`] value objects, and the published [`RuleVersion`].
//!
//! - **Store** ([`store`]): [`RuleStore`]: publish, resolve-as-of, history.
//!   Writes are serialized per jurisdiction; reads never block on other
//!   jurisdictions. Every publication appends an observable [`RuleEvent`].
//!
//! - **Rulepacks** ([`rulepack`]): YAML bundles of jurisdictions and their
//!   ordered versions, loaded at start-up and installed idempotently.
//!
//! ## Invariant
//!
//! For any jurisdiction and any date at most one version is effective:
//! the latest version whose `effective_from` is on or before that date.
//! A version is never edited or deleted. Corrections are new versions.

pub mod error;
pub mod model;
pub mod rulepack;
pub mod store;

pub use error::{RuleStoreError, RulepackError};
pub use model::{
    CompactParticipation, CreditTypeAcceptance, GracePolicy, Jurisdiction, ProrationRule,
    QuotaMeasure, QuotaUnit, Recurrence, RuleHistory, RuleSet, RuleVersion, RuleVersionId,
    TopicQuota,
};
pub use rulepack::{load_rulepack, load_rulepack_dir, InstallReport, Rulepack};
pub use store::{RuleEvent, RuleEventKind, RuleStore};

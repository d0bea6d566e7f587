//! # Rule Store
//!
//! Append-only storage of jurisdictions and their rule versions.
//!
//! ## Concurrency
//!
//! The jurisdiction map sits behind a `parking_lot::RwLock` that is only
//! write-locked to register a new jurisdiction. Each jurisdiction owns its
//! own `RwLock` over its version list:
//!
//! - publishing takes that jurisdiction's write lock, so two publishes to the
//!   same jurisdiction are serialized and the overlap check cannot race;
//! - publishes to different jurisdictions proceed in parallel;
//! - readers clone `Arc`s out under a read lock and never hold it while
//!   evaluating.
//!
//! ## Observability
//!
//! Every registration and publication appends a [`RuleEvent`] with a
//! monotonically increasing sequence number. Consumers poll
//! [`RuleStore::events_since`] to learn which jurisdictions need
//! re-evaluation.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use credmate_core::{Clock, JurisdictionId, SystemClock, Timestamp};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::RuleStoreError;
use crate::model::{
    CompactParticipation, Jurisdiction, RuleHistory, RuleSet, RuleVersion, RuleVersionId,
};

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// What happened in a [`RuleEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleEventKind {
    /// A jurisdiction was registered.
    JurisdictionRegistered {
        /// The new jurisdiction.
        jurisdiction: JurisdictionId,
    },
    /// A rule version was published.
    VersionPublished {
        /// The new version.
        version_id: RuleVersionId,
        /// Its effective date.
        effective_from: NaiveDate,
    },
}

/// An observable change to the rule store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleEvent {
    /// 1-based, gap-free sequence across all jurisdictions.
    pub sequence: u64,
    /// The affected jurisdiction.
    pub jurisdiction: JurisdictionId,
    /// What happened.
    pub kind: RuleEventKind,
    /// When it happened.
    pub recorded_at: Timestamp,
}

// ---------------------------------------------------------------------------
// RuleStore
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct JurisdictionEntry {
    jurisdiction: Jurisdiction,
    versions: RwLock<Vec<Arc<RuleVersion>>>,
}

/// Thread-safe, append-only store of jurisdictions and rule versions.
pub struct RuleStore {
    jurisdictions: RwLock<BTreeMap<JurisdictionId, Arc<JurisdictionEntry>>>,
    events: RwLock<Vec<RuleEvent>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for RuleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleStore")
            .field("jurisdictions", &self.jurisdictions.read().len())
            .field("events", &self.events.read().len())
            .finish()
    }
}

impl Default for RuleStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleStore {
    /// An empty store using the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// An empty store using the given clock for publication timestamps.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            jurisdictions: RwLock::new(BTreeMap::new()),
            events: RwLock::new(Vec::new()),
            clock,
        }
    }

    fn entry(&self, id: &JurisdictionId) -> Result<Arc<JurisdictionEntry>, RuleStoreError> {
        self.jurisdictions
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| RuleStoreError::UnknownJurisdiction(id.clone()))
    }

    fn push_event(&self, jurisdiction: JurisdictionId, kind: RuleEventKind) {
        let mut events = self.events.write();
        let sequence = events.len() as u64 + 1;
        events.push(RuleEvent {
            sequence,
            jurisdiction,
            kind,
            recorded_at: self.clock.now(),
        });
    }

    /// Register a jurisdiction.
    ///
    /// Registering an identical definition again is a no-op that returns
    /// `Ok(false)`; a first registration returns `Ok(true)`.
    ///
    /// # Errors
    ///
    /// [`RuleStoreError::JurisdictionConflict`] if a different definition
    /// already uses the identifier.
    pub fn register_jurisdiction(&self, jurisdiction: Jurisdiction) -> Result<bool, RuleStoreError> {
        let id = jurisdiction.id.clone();
        {
            let mut map = self.jurisdictions.write();
            if let Some(existing) = map.get(&id) {
                if existing.jurisdiction == jurisdiction {
                    return Ok(false);
                }
                return Err(RuleStoreError::JurisdictionConflict { jurisdiction: id });
            }
            map.insert(
                id.clone(),
                Arc::new(JurisdictionEntry {
                    jurisdiction,
                    versions: RwLock::new(Vec::new()),
                }),
            );
        }
        tracing::info!(jurisdiction = %id, "jurisdiction registered");
        self.push_event(
            id.clone(),
            RuleEventKind::JurisdictionRegistered { jurisdiction: id },
        );
        Ok(true)
    }

    /// Publish a new rule version effective from `effective_from`.
    ///
    /// # Errors
    ///
    /// - [`RuleStoreError::UnknownJurisdiction`] if not registered.
    /// - [`RuleStoreError::InvalidRuleVersion`] if the rule body is invalid.
    /// - [`RuleStoreError::OverlappingEffectiveRange`] if `effective_from` is
    ///   on or before the latest existing version's `effective_from`.
    pub fn publish_rule_version(
        &self,
        jurisdiction_id: &JurisdictionId,
        rules: RuleSet,
        effective_from: NaiveDate,
    ) -> Result<Arc<RuleVersion>, RuleStoreError> {
        let entry = self.entry(jurisdiction_id)?;
        rules.validate(jurisdiction_id)?;

        let version = {
            let mut versions = entry.versions.write();
            if let Some(latest) = versions.last() {
                if effective_from <= latest.effective_from {
                    tracing::warn!(
                        jurisdiction = %jurisdiction_id,
                        %effective_from,
                        latest = %latest.effective_from,
                        "rejected overlapping rule version"
                    );
                    return Err(RuleStoreError::OverlappingEffectiveRange {
                        jurisdiction: jurisdiction_id.clone(),
                        effective_from,
                        latest: latest.effective_from,
                    });
                }
            }
            if let Some(ref corrected) = rules.corrects {
                if corrected.sequence as usize > versions.len() {
                    return Err(RuleStoreError::InvalidRuleVersion {
                        jurisdiction: jurisdiction_id.clone(),
                        reason: format!("corrects {corrected}, which has not been published"),
                    });
                }
            }
            let version_id = RuleVersionId {
                jurisdiction: jurisdiction_id.clone(),
                sequence: versions.len() as u32 + 1,
            };
            let version = Arc::new(RuleVersion::new(
                version_id,
                effective_from,
                rules,
                self.clock.now(),
            )?);
            versions.push(Arc::clone(&version));
            version
        };

        tracing::info!(
            version = %version.version_id,
            %effective_from,
            digest = %version.content_digest,
            "rule version published"
        );
        self.push_event(
            jurisdiction_id.clone(),
            RuleEventKind::VersionPublished {
                version_id: version.version_id.clone(),
                effective_from,
            },
        );
        Ok(version)
    }

    /// Re-insert a previously published version during hydration.
    ///
    /// Versions must arrive in sequence order. No event is emitted.
    pub fn restore_version(&self, version: RuleVersion) -> Result<(), RuleStoreError> {
        let entry = self.entry(&version.jurisdiction_id)?;
        let mut versions = entry.versions.write();
        let expected = versions.len() as u32 + 1;
        let ordered = versions
            .last()
            .map_or(true, |latest| version.effective_from > latest.effective_from);
        if version.version_id.sequence != expected || !ordered {
            return Err(RuleStoreError::RestoreOutOfOrder {
                version: version.version_id.to_string(),
                expected,
            });
        }
        versions.push(Arc::new(version));
        Ok(())
    }

    /// The version effective on `as_of`.
    ///
    /// # Errors
    ///
    /// - [`RuleStoreError::UnknownJurisdiction`]
    /// - [`RuleStoreError::NoVersionsPublished`] if nothing was ever published.
    /// - [`RuleStoreError::NoEffectiveVersion`] if `as_of` precedes the
    ///   earliest version.
    pub fn effective_rule_version(
        &self,
        jurisdiction_id: &JurisdictionId,
        as_of: NaiveDate,
    ) -> Result<Arc<RuleVersion>, RuleStoreError> {
        let history = self.history(jurisdiction_id)?;
        if history.versions.is_empty() {
            return Err(RuleStoreError::NoVersionsPublished(jurisdiction_id.clone()));
        }
        history
            .effective_at(as_of)
            .cloned()
            .ok_or_else(|| RuleStoreError::NoEffectiveVersion {
                jurisdiction: jurisdiction_id.clone(),
                as_of,
            })
    }

    /// The earliest published version.
    pub fn earliest_rule_version(
        &self,
        jurisdiction_id: &JurisdictionId,
    ) -> Result<Arc<RuleVersion>, RuleStoreError> {
        self.history(jurisdiction_id)?
            .earliest()
            .cloned()
            .ok_or_else(|| RuleStoreError::NoVersionsPublished(jurisdiction_id.clone()))
    }

    /// A point-in-time copy of the jurisdiction and all its versions.
    pub fn history(&self, jurisdiction_id: &JurisdictionId) -> Result<RuleHistory, RuleStoreError> {
        let entry = self.entry(jurisdiction_id)?;
        let versions = entry.versions.read().clone();
        Ok(RuleHistory {
            jurisdiction: entry.jurisdiction.clone(),
            versions,
        })
    }

    /// All versions of a jurisdiction in publication order.
    pub fn versions(
        &self,
        jurisdiction_id: &JurisdictionId,
    ) -> Result<Vec<Arc<RuleVersion>>, RuleStoreError> {
        Ok(self.history(jurisdiction_id)?.versions)
    }

    /// A specific version by identifier.
    pub fn version(&self, version_id: &RuleVersionId) -> Option<Arc<RuleVersion>> {
        let entry = self.entry(&version_id.jurisdiction).ok()?;
        let versions = entry.versions.read();
        versions
            .get((version_id.sequence as usize).checked_sub(1)?)
            .cloned()
    }

    /// The next `effective_from` strictly after `date`.
    pub fn next_effective_after(
        &self,
        jurisdiction_id: &JurisdictionId,
        date: NaiveDate,
    ) -> Result<Option<NaiveDate>, RuleStoreError> {
        Ok(self.history(jurisdiction_id)?.next_effective_after(date))
    }

    /// Compact participation in force on `as_of`: the latest version on or
    /// before that date that sets it, else the registration flags.
    pub fn jurisdiction_profile(
        &self,
        jurisdiction_id: &JurisdictionId,
        as_of: NaiveDate,
    ) -> Result<CompactParticipation, RuleStoreError> {
        Ok(self.history(jurisdiction_id)?.profile_at(as_of))
    }

    /// A registered jurisdiction.
    pub fn jurisdiction(&self, id: &JurisdictionId) -> Option<Jurisdiction> {
        self.jurisdictions
            .read()
            .get(id)
            .map(|e| e.jurisdiction.clone())
    }

    /// All registered jurisdictions, ordered by identifier.
    pub fn jurisdictions(&self) -> Vec<Jurisdiction> {
        self.jurisdictions
            .read()
            .values()
            .map(|e| e.jurisdiction.clone())
            .collect()
    }

    /// Events with a sequence number greater than `after`.
    pub fn events_since(&self, after: u64) -> Vec<RuleEvent> {
        let events = self.events.read();
        let start = usize::try_from(after).unwrap_or(usize::MAX).min(events.len());
        events[start..].to_vec()
    }

    /// Sequence number of the latest event (0 if none).
    pub fn last_event_sequence(&self) -> u64 {
        self.events.read().len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CreditTypeAcceptance, GracePolicy, ProrationRule};
    use credmate_core::{CreditHours, CreditType, FixedClock, Weight};

    fn jid(s: &str) -> JurisdictionId {
        JurisdictionId::new(s).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn jurisdiction(id: &str) -> Jurisdiction {
        Jurisdiction {
            id: jid(id),
            name: format!("{id} board"),
            imlc_member: false,
            principal_licensure_eligible: false,
        }
    }

    fn rules(hours: u64) -> RuleSet {
        RuleSet {
            cycle_length_months: 24,
            total_hours: CreditHours::from_whole(hours),
            topic_quotas: vec![],
            accepted_credit_types: vec![CreditTypeAcceptance {
                credit_type: CreditType::new("AMA_PRA_1").unwrap(),
                weight: Weight::ONE,
            }],
            grace_policy: GracePolicy::None,
            proration: ProrationRule::MonthsRemaining,
            nominal_cycle_anchor: None,
            compact: None,
            note: None,
            corrects: None,
        }
    }

    fn store_with(id: &str) -> RuleStore {
        let store = RuleStore::with_clock(Arc::new(FixedClock::at_date(date(2025, 1, 1))));
        store.register_jurisdiction(jurisdiction(id)).unwrap();
        store
    }

    #[test]
    fn register_is_idempotent_for_identical_definition() {
        let store = store_with("US-TX");
        assert!(!store.register_jurisdiction(jurisdiction("US-TX")).unwrap());
        assert_eq!(store.jurisdictions().len(), 1);
    }

    #[test]
    fn register_conflicting_definition_fails() {
        let store = store_with("US-TX");
        let mut other = jurisdiction("US-TX");
        other.imlc_member = true;
        let err = store.register_jurisdiction(other).unwrap_err();
        assert_eq!(err.kind(), "JURISDICTION_CONFLICT");
    }

    #[test]
    fn publish_assigns_sequences() {
        let store = store_with("US-TX");
        let v1 = store
            .publish_rule_version(&jid("US-TX"), rules(40), date(2020, 1, 1))
            .unwrap();
        let v2 = store
            .publish_rule_version(&jid("US-TX"), rules(48), date(2024, 1, 1))
            .unwrap();
        assert_eq!(v1.version_id.to_string(), "US-TX/v1");
        assert_eq!(v2.version_id.to_string(), "US-TX/v2");
        assert_eq!(v1.published_at.date(), date(2025, 1, 1));
    }

    #[test]
    fn publish_rejects_overlap() {
        let store = store_with("US-TX");
        store
            .publish_rule_version(&jid("US-TX"), rules(40), date(2024, 1, 1))
            .unwrap();
        let same_day = store
            .publish_rule_version(&jid("US-TX"), rules(48), date(2024, 1, 1))
            .unwrap_err();
        let earlier = store
            .publish_rule_version(&jid("US-TX"), rules(48), date(2023, 6, 1))
            .unwrap_err();
        assert!(matches!(same_day, RuleStoreError::OverlappingEffectiveRange { .. }));
        assert!(matches!(earlier, RuleStoreError::OverlappingEffectiveRange { .. }));
        assert_eq!(store.versions(&jid("US-TX")).unwrap().len(), 1);
    }

    #[test]
    fn publish_to_unknown_jurisdiction_fails() {
        let store = RuleStore::new();
        let err = store
            .publish_rule_version(&jid("US-ZZ"), rules(40), date(2024, 1, 1))
            .unwrap_err();
        assert_eq!(err, RuleStoreError::UnknownJurisdiction(jid("US-ZZ")));
    }

    #[test]
    fn correction_must_reference_published_version() {
        let store = store_with("US-TX");
        let mut correction = rules(40);
        correction.corrects = RuleVersionId::parse("US-TX/v4");
        let err = store
            .publish_rule_version(&jid("US-TX"), correction, date(2024, 1, 1))
            .unwrap_err();
        assert_eq!(err.kind(), "INVALID_RULE_VERSION");
    }

    #[test]
    fn effective_lookup_is_deterministic() {
        let store = store_with("US-TX");
        store
            .publish_rule_version(&jid("US-TX"), rules(40), date(2020, 1, 1))
            .unwrap();
        store
            .publish_rule_version(&jid("US-TX"), rules(48), date(2024, 1, 1))
            .unwrap();

        let before = store.effective_rule_version(&jid("US-TX"), date(2019, 1, 1));
        assert!(matches!(before, Err(RuleStoreError::NoEffectiveVersion { .. })));

        let mid = store
            .effective_rule_version(&jid("US-TX"), date(2023, 12, 31))
            .unwrap();
        assert_eq!(mid.rules.total_hours, CreditHours::from_whole(40));

        let later = store
            .effective_rule_version(&jid("US-TX"), date(2030, 1, 1))
            .unwrap();
        assert_eq!(later.rules.total_hours, CreditHours::from_whole(48));
    }

    #[test]
    fn lookup_without_versions() {
        let store = store_with("US-TX");
        let err = store
            .effective_rule_version(&jid("US-TX"), date(2024, 1, 1))
            .unwrap_err();
        assert_eq!(err, RuleStoreError::NoVersionsPublished(jid("US-TX")));
    }

    #[test]
    fn events_are_observable() {
        let store = store_with("US-TX");
        let seen = store.last_event_sequence();
        store
            .publish_rule_version(&jid("US-TX"), rules(40), date(2024, 1, 1))
            .unwrap();
        let events = store.events_since(seen);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].sequence, seen + 1);
        assert!(matches!(events[0].kind, RuleEventKind::VersionPublished { .. }));
        assert!(store.events_since(store.last_event_sequence()).is_empty());
    }

    #[test]
    fn version_lookup_by_id() {
        let store = store_with("US-TX");
        let v1 = store
            .publish_rule_version(&jid("US-TX"), rules(40), date(2024, 1, 1))
            .unwrap();
        assert_eq!(store.version(&v1.version_id).unwrap().content_digest, v1.content_digest);
        assert!(store.version(&RuleVersionId::parse("US-TX/v2").unwrap()).is_none());
    }

    #[test]
    fn restore_requires_order() {
        let source = store_with("US-TX");
        let v1 = source
            .publish_rule_version(&jid("US-TX"), rules(40), date(2020, 1, 1))
            .unwrap();
        let v2 = source
            .publish_rule_version(&jid("US-TX"), rules(48), date(2024, 1, 1))
            .unwrap();

        let target = store_with("US-TX");
        let events_before = target.last_event_sequence();
        assert!(target.restore_version((*v2).clone()).is_err());
        target.restore_version((*v1).clone()).unwrap();
        target.restore_version((*v2).clone()).unwrap();
        assert_eq!(target.versions(&jid("US-TX")).unwrap().len(), 2);
        assert_eq!(target.last_event_sequence(), events_before);
    }

    #[test]
    fn profile_follows_the_version_in_force() {
        let store = store_with("US-MI");
        store
            .publish_rule_version(&jid("US-MI"), rules(150), date(2020, 1, 1))
            .unwrap();
        let mut joined = rules(150);
        joined.compact = Some(CompactParticipation {
            imlc_member: true,
            principal_licensure_eligible: true,
        });
        store
            .publish_rule_version(&jid("US-MI"), joined, date(2024, 1, 1))
            .unwrap();

        let before = store
            .jurisdiction_profile(&jid("US-MI"), date(2023, 12, 31))
            .unwrap();
        assert!(!before.imlc_member);
        let after = store
            .jurisdiction_profile(&jid("US-MI"), date(2024, 1, 1))
            .unwrap();
        assert!(after.imlc_member);
        assert!(after.principal_licensure_eligible);
        assert!(store.jurisdiction_profile(&jid("US-ZZ"), date(2024, 1, 1)).is_err());
    }

    #[test]
    fn concurrent_publishes_to_one_jurisdiction_never_overlap() {
        let store = Arc::new(store_with("US-TX"));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store
                        .publish_rule_version(&jid("US-TX"), rules(40), date(2020 + i, 1, 1))
                        .is_ok()
                })
            })
            .collect();
        let published = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        let versions = store.versions(&jid("US-TX")).unwrap();
        assert_eq!(versions.len(), published);
        assert!(versions
            .windows(2)
            .all(|w| w[0].effective_from < w[1].effective_from));
    }
}

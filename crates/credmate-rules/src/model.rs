//! # Rule Model
//!
//! Value objects describing what a jurisdiction requires in one renewal
//! cycle, and the effective-dated [`RuleVersion`] that wraps them.
//!
//! ## Design
//!
//! Requirement variants are tagged enums rather than flag combinations:
//!
//! - [`GracePolicy`] is `none`, `practice_allowed { days }` or
//!   `practice_barred { days }`. Whether a physician may keep practicing
//!   during grace is explicit in the type, never inferred.
//! - [`QuotaMeasure`] is `hours { required }` or `count { required }`, so a
//!   "one activity on implicit bias" mandate cannot be confused with a
//!   "two hours of ethics" one.
//! - [`Recurrence`] distinguishes per-cycle mandates from one-time ones
//!   that any activity completed during the license's lifetime satisfies.

use std::sync::Arc;

use chrono::NaiveDate;
use credmate_core::{
    sha256_digest, CanonicalBytes, ContentDigest, CreditHours, CreditType, JurisdictionId,
    Timestamp, Topic, Weight,
};
use serde::{Deserialize, Serialize};

use crate::error::RuleStoreError;

/// Upper bound on a renewal cycle. Observed values are 12, 24, 36 and 48.
pub const MAX_CYCLE_LENGTH_MONTHS: u32 = 120;

/// Upper bound on a grace window in days.
pub const MAX_GRACE_DAYS: u32 = 3_650;

// ---------------------------------------------------------------------------
// Jurisdiction
// ---------------------------------------------------------------------------

/// Interstate Medical Licensure Compact participation flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CompactParticipation {
    /// The jurisdiction participates in the IMLC.
    pub imlc_member: bool,
    /// The jurisdiction can serve as a physician's state of principal licensure.
    pub principal_licensure_eligible: bool,
}

/// A licensing authority whose CME rules apply to its licenses.
///
/// Immutable once registered. Changes to compact participation are
/// expressed through [`RuleSet::compact`] on a later version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jurisdiction {
    /// Stable identifier, e.g. `US-TX`.
    pub id: JurisdictionId,
    /// Display name of the board.
    pub name: String,
    /// IMLC participation at registration time.
    #[serde(default)]
    pub imlc_member: bool,
    /// Principal-licensure eligibility at registration time.
    #[serde(default)]
    pub principal_licensure_eligible: bool,
}

impl Jurisdiction {
    /// Compact flags as registered.
    pub fn compact(&self) -> CompactParticipation {
        CompactParticipation {
            imlc_member: self.imlc_member,
            principal_licensure_eligible: self.principal_licensure_eligible,
        }
    }
}

// ---------------------------------------------------------------------------
// Requirement value objects
// ---------------------------------------------------------------------------

/// Unit in which a topic quota is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaUnit {
    /// Weighted credit hours.
    Hours,
    /// Number of qualifying activities.
    Count,
}

impl QuotaUnit {
    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hours => "hours",
            Self::Count => "count",
        }
    }
}

impl std::fmt::Display for QuotaUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How much of a topic is required.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "unit", rename_all = "snake_case")]
pub enum QuotaMeasure {
    /// At least `required` weighted credit hours tagged with the topic.
    Hours {
        /// Required hours.
        required: CreditHours,
    },
    /// At least `required` distinct activities tagged with the topic.
    Count {
        /// Required number of activities.
        required: u32,
    },
}

impl QuotaMeasure {
    /// The unit of this measure.
    pub fn unit(&self) -> QuotaUnit {
        match self {
            Self::Hours { .. } => QuotaUnit::Hours,
            Self::Count { .. } => QuotaUnit::Count,
        }
    }
}

/// Whether a topic quota resets each cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recurrence {
    /// Must be satisfied within every cycle window.
    #[default]
    PerCycle,
    /// Satisfied once by any qualifying activity completed up to the
    /// evaluation date, in any cycle.
    OneTime,
}

/// A topic-specific sub-requirement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopicQuota {
    /// The topic tag activities must carry.
    pub topic: Topic,
    /// Hours or count required.
    #[serde(flatten)]
    pub measure: QuotaMeasure,
    /// Per-cycle or one-time.
    #[serde(default)]
    pub recurrence: Recurrence,
}

/// A credit type the jurisdiction accepts, with its equivalence weight.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CreditTypeAcceptance {
    /// The accepted credit type.
    pub credit_type: CreditType,
    /// Multiplier applied to the certificate's credit amount.
    #[serde(default)]
    pub weight: Weight,
}

/// What happens after a cycle ends with requirements unmet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GracePolicy {
    /// The license is non-compliant as soon as the cycle ends.
    #[default]
    None,
    /// The physician may keep practicing for `days` while curing the gap.
    PracticeAllowed {
        /// Length of the grace window after cycle end.
        days: u32,
    },
    /// The gap may be cured within `days`, but practice is barred meanwhile.
    PracticeBarred {
        /// Length of the cure window after cycle end.
        days: u32,
    },
}

impl GracePolicy {
    /// Length of the grace window in days (zero for `None`).
    pub fn days(&self) -> u32 {
        match self {
            Self::None => 0,
            Self::PracticeAllowed { days } | Self::PracticeBarred { days } => *days,
        }
    }

    /// Whether practice continues during the grace window.
    pub fn practice_allowed(&self) -> bool {
        matches!(self, Self::PracticeAllowed { .. })
    }
}

/// How a partial first cycle's total threshold is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProrationRule {
    /// The full threshold applies even to a partial first cycle.
    None,
    /// `ceil(total_hours × months_remaining / cycle_length_months)`.
    #[default]
    MonthsRemaining,
    /// A partial first cycle carries no hour requirement.
    ExemptFirstCycle,
}

// ---------------------------------------------------------------------------
// RuleSet
// ---------------------------------------------------------------------------

/// The requirement body of a rule version, as authored by an administrator
/// or a rulepack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    /// Renewal cycle length in months.
    pub cycle_length_months: u32,
    /// Total weighted credit hours required per cycle.
    pub total_hours: CreditHours,
    /// Topic-specific sub-requirements.
    #[serde(default)]
    pub topic_quotas: Vec<TopicQuota>,
    /// Accepted credit types and their weights.
    #[serde(default)]
    pub accepted_credit_types: Vec<CreditTypeAcceptance>,
    /// Post-cycle grace behavior.
    #[serde(default)]
    pub grace_policy: GracePolicy,
    /// First-cycle proration behavior.
    #[serde(default)]
    pub proration: ProrationRule,
    /// A date on the jurisdiction's nominal cycle grid. Nominal boundaries
    /// fall at this anchor plus whole multiples of the cycle length. Absent
    /// means cycles run from each license's own cycle start.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nominal_cycle_anchor: Option<NaiveDate>,
    /// Compact participation from this version on, overriding registration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compact: Option<CompactParticipation>,
    /// Free-text note (statute citation, correction rationale).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// The version this one corrects, when published as a correction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrects: Option<RuleVersionId>,
}

impl RuleSet {
    /// A zero threshold with no topic quotas. Always compliant on hours.
    pub fn is_zero_threshold(&self) -> bool {
        self.total_hours.is_zero() && self.topic_quotas.is_empty()
    }

    /// The equivalence weight for a credit type, or `None` if not accepted.
    pub fn weight_for(&self, credit_type: &CreditType) -> Option<Weight> {
        self.accepted_credit_types
            .iter()
            .find(|a| &a.credit_type == credit_type)
            .map(|a| a.weight)
    }

    /// Whether a credit type is accepted.
    pub fn accepts(&self, credit_type: &CreditType) -> bool {
        self.weight_for(credit_type).is_some()
    }

    /// Check structural validity before publication.
    pub fn validate(&self, jurisdiction: &JurisdictionId) -> Result<(), RuleStoreError> {
        let invalid = |reason: String| RuleStoreError::InvalidRuleVersion {
            jurisdiction: jurisdiction.clone(),
            reason,
        };

        if self.cycle_length_months == 0 || self.cycle_length_months > MAX_CYCLE_LENGTH_MONTHS {
            return Err(invalid(format!(
                "cycle_length_months must be in 1..={MAX_CYCLE_LENGTH_MONTHS}, got {}",
                self.cycle_length_months
            )));
        }

        let mut topics: Vec<&Topic> = self.topic_quotas.iter().map(|q| &q.topic).collect();
        topics.sort();
        if let Some(pair) = topics.windows(2).find(|w| w[0] == w[1]) {
            return Err(invalid(format!("topic {} has more than one quota", pair[0])));
        }

        for quota in &self.topic_quotas {
            let empty = match quota.measure {
                QuotaMeasure::Hours { required } => required.is_zero(),
                QuotaMeasure::Count { required } => required == 0,
            };
            if empty {
                return Err(invalid(format!("topic {} quota requires nothing", quota.topic)));
            }
        }

        let mut types: Vec<&CreditType> = self
            .accepted_credit_types
            .iter()
            .map(|a| &a.credit_type)
            .collect();
        types.sort();
        if let Some(pair) = types.windows(2).find(|w| w[0] == w[1]) {
            return Err(invalid(format!("credit type {} is listed more than once", pair[0])));
        }

        if !self.is_zero_threshold() && self.accepted_credit_types.is_empty() {
            return Err(invalid(
                "at least one accepted credit type is required when hours or topics are required"
                    .into(),
            ));
        }

        if self.grace_policy.days() > MAX_GRACE_DAYS {
            return Err(invalid(format!(
                "grace window of {} days exceeds {MAX_GRACE_DAYS}",
                self.grace_policy.days()
            )));
        }
        if matches!(
            self.grace_policy,
            GracePolicy::PracticeAllowed { days: 0 } | GracePolicy::PracticeBarred { days: 0 }
        ) {
            return Err(invalid("a grace policy must grant at least one day; use kind: none".into()));
        }

        if let Some(ref note) = self.note {
            if note.len() > 2_000 {
                return Err(invalid("note must not exceed 2000 characters".into()));
            }
        }

        if let Some(ref corrected) = self.corrects {
            if &corrected.jurisdiction != jurisdiction {
                return Err(invalid(format!(
                    "corrects {corrected}, which belongs to another jurisdiction"
                )));
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RuleVersionId
// ---------------------------------------------------------------------------

/// Identifier of a published version: `{jurisdiction}/v{sequence}`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RuleVersionId {
    /// The owning jurisdiction.
    pub jurisdiction: JurisdictionId,
    /// 1-based publication order within the jurisdiction.
    pub sequence: u32,
}

impl RuleVersionId {
    /// Parse the `{jurisdiction}/v{sequence}` form.
    pub fn parse(value: &str) -> Option<Self> {
        let (jid, seq) = value.rsplit_once("/v")?;
        let jurisdiction = JurisdictionId::new(jid).ok()?;
        let sequence: u32 = seq.parse().ok()?;
        if sequence == 0 {
            return None;
        }
        Some(Self {
            jurisdiction,
            sequence,
        })
    }
}

impl std::fmt::Display for RuleVersionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/v{}", self.jurisdiction, self.sequence)
    }
}

impl Serialize for RuleVersionId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for RuleVersionId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid rule version id: {s}")))
    }
}

// ---------------------------------------------------------------------------
// RuleVersion
// ---------------------------------------------------------------------------

/// A published, immutable, effective-dated rule version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleVersion {
    /// `{jurisdiction}/v{sequence}`.
    pub version_id: RuleVersionId,
    /// The owning jurisdiction.
    pub jurisdiction_id: JurisdictionId,
    /// First date on which this version governs.
    pub effective_from: NaiveDate,
    /// The requirement body.
    pub rules: RuleSet,
    /// When the version was published.
    pub published_at: Timestamp,
    /// Digest over jurisdiction, effective date and rule body.
    pub content_digest: ContentDigest,
}

#[derive(Serialize)]
struct VersionDigestBody<'a> {
    jurisdiction_id: &'a JurisdictionId,
    effective_from: NaiveDate,
    rules: &'a RuleSet,
}

impl RuleVersion {
    /// Assemble a version and compute its content digest.
    pub fn new(
        version_id: RuleVersionId,
        effective_from: NaiveDate,
        rules: RuleSet,
        published_at: Timestamp,
    ) -> Result<Self, RuleStoreError> {
        let content_digest =
            Self::compute_digest(&version_id.jurisdiction, effective_from, &rules)?;
        Ok(Self {
            jurisdiction_id: version_id.jurisdiction.clone(),
            version_id,
            effective_from,
            rules,
            published_at,
            content_digest,
        })
    }

    /// Digest of the fields that define a version's meaning. Publication
    /// time and sequence number are excluded, so republishing the same
    /// body on the same date yields the same digest.
    pub fn compute_digest(
        jurisdiction_id: &JurisdictionId,
        effective_from: NaiveDate,
        rules: &RuleSet,
    ) -> Result<ContentDigest, RuleStoreError> {
        let canonical = CanonicalBytes::new(&VersionDigestBody {
            jurisdiction_id,
            effective_from,
            rules,
        })?;
        Ok(sha256_digest(&canonical))
    }
}

// ---------------------------------------------------------------------------
// RuleHistory
// ---------------------------------------------------------------------------

/// A point-in-time copy of one jurisdiction's version list, ordered by
/// `effective_from`. Handed to the evaluator so evaluation never touches
/// the store's locks.
#[derive(Debug, Clone)]
pub struct RuleHistory {
    /// The jurisdiction.
    pub jurisdiction: Jurisdiction,
    /// Versions in ascending `effective_from` order.
    pub versions: Vec<Arc<RuleVersion>>,
}

impl RuleHistory {
    /// The version effective on `as_of`: the latest one whose
    /// `effective_from` is on or before it.
    pub fn effective_at(&self, as_of: NaiveDate) -> Option<&Arc<RuleVersion>> {
        self.versions
            .iter()
            .rev()
            .find(|v| v.effective_from <= as_of)
    }

    /// The first version ever published.
    pub fn earliest(&self) -> Option<&Arc<RuleVersion>> {
        self.versions.first()
    }

    /// The most recently published version.
    pub fn latest(&self) -> Option<&Arc<RuleVersion>> {
        self.versions.last()
    }

    /// The next `effective_from` strictly after `date`, if one is scheduled.
    pub fn next_effective_after(&self, date: NaiveDate) -> Option<NaiveDate> {
        self.versions
            .iter()
            .map(|v| v.effective_from)
            .find(|d| *d > date)
    }

    /// Compact participation effective on `as_of`.
    pub fn profile_at(&self, as_of: NaiveDate) -> CompactParticipation {
        self.versions
            .iter()
            .rev()
            .filter(|v| v.effective_from <= as_of)
            .find_map(|v| v.rules.compact)
            .unwrap_or_else(|| self.jurisdiction.compact())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jid() -> JurisdictionId {
        JurisdictionId::new("US-TX").unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn basic_rules() -> RuleSet {
        RuleSet {
            cycle_length_months: 24,
            total_hours: CreditHours::from_whole(40),
            topic_quotas: vec![TopicQuota {
                topic: Topic::new("ethics").unwrap(),
                measure: QuotaMeasure::Hours {
                    required: CreditHours::from_whole(2),
                },
                recurrence: Recurrence::PerCycle,
            }],
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

    #[test]
    fn basic_rules_validate() {
        assert!(basic_rules().validate(&jid()).is_ok());
    }

    #[test]
    fn zero_cycle_rejected() {
        let mut rules = basic_rules();
        rules.cycle_length_months = 0;
        let err = rules.validate(&jid()).unwrap_err();
        assert_eq!(err.kind(), "INVALID_RULE_VERSION");
    }

    #[test]
    fn duplicate_topic_rejected() {
        let mut rules = basic_rules();
        let dup = rules.topic_quotas[0].clone();
        rules.topic_quotas.push(dup);
        assert!(rules.validate(&jid()).is_err());
    }

    #[test]
    fn duplicate_credit_type_rejected() {
        let mut rules = basic_rules();
        let dup = rules.accepted_credit_types[0].clone();
        rules.accepted_credit_types.push(dup);
        assert!(rules.validate(&jid()).is_err());
    }

    #[test]
    fn hours_without_accepted_types_rejected() {
        let mut rules = basic_rules();
        rules.accepted_credit_types.clear();
        assert!(rules.validate(&jid()).is_err());
    }

    #[test]
    fn zero_threshold_may_accept_nothing() {
        let mut rules = basic_rules();
        rules.total_hours = CreditHours::ZERO;
        rules.topic_quotas.clear();
        rules.accepted_credit_types.clear();
        assert!(rules.is_zero_threshold());
        assert!(rules.validate(&jid()).is_ok());
    }

    #[test]
    fn zero_day_grace_rejected() {
        let mut rules = basic_rules();
        rules.grace_policy = GracePolicy::PracticeBarred { days: 0 };
        assert!(rules.validate(&jid()).is_err());
    }

    #[test]
    fn grace_policy_serializes_tagged() {
        let json = serde_json::to_value(GracePolicy::PracticeAllowed { days: 30 }).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "practice_allowed", "days": 30}));
        let none: GracePolicy = serde_json::from_value(serde_json::json!({"kind": "none"})).unwrap();
        assert_eq!(none, GracePolicy::None);
    }

    #[test]
    fn topic_quota_flattens_measure() {
        let quota: TopicQuota = serde_json::from_value(serde_json::json!({
            "topic": "Implicit Bias",
            "unit": "count",
            "required": 1,
            "recurrence": "one_time"
        }))
        .unwrap();
        assert_eq!(quota.topic.as_str(), "implicit_bias");
        assert_eq!(quota.measure, QuotaMeasure::Count { required: 1 });
        assert_eq!(quota.recurrence, Recurrence::OneTime);
    }

    #[test]
    fn weight_lookup() {
        let rules = basic_rules();
        assert_eq!(
            rules.weight_for(&CreditType::new("ama_pra_1").unwrap()),
            Some(Weight::ONE)
        );
        assert!(!rules.accepts(&CreditType::new("AOA_1A").unwrap()));
    }

    #[test]
    fn version_id_roundtrip() {
        let id = RuleVersionId {
            jurisdiction: JurisdictionId::new("US-CA-DO").unwrap(),
            sequence: 3,
        };
        assert_eq!(id.to_string(), "US-CA-DO/v3");
        assert_eq!(RuleVersionId::parse("US-CA-DO/v3"), Some(id));
        assert!(RuleVersionId::parse("US-TX/v0").is_none());
        assert!(RuleVersionId::parse("US-TX").is_none());
    }

    #[test]
    fn digest_ignores_publication_time() {
        let id = RuleVersionId {
            jurisdiction: jid(),
            sequence: 1,
        };
        let a = RuleVersion::new(
            id.clone(),
            date(2024, 1, 1),
            basic_rules(),
            Timestamp::start_of(date(2024, 1, 1)),
        )
        .unwrap();
        let b = RuleVersion::new(id, date(2024, 1, 1), basic_rules(), Timestamp::now()).unwrap();
        assert_eq!(a.content_digest, b.content_digest);
    }

    fn history() -> RuleHistory {
        let jurisdiction = Jurisdiction {
            id: jid(),
            name: "Texas Medical Board".into(),
            imlc_member: true,
            principal_licensure_eligible: true,
        };
        let mut later = basic_rules();
        later.compact = Some(CompactParticipation {
            imlc_member: false,
            principal_licensure_eligible: false,
        });
        let versions = vec![
            Arc::new(
                RuleVersion::new(
                    RuleVersionId { jurisdiction: jid(), sequence: 1 },
                    date(2020, 1, 1),
                    basic_rules(),
                    Timestamp::now(),
                )
                .unwrap(),
            ),
            Arc::new(
                RuleVersion::new(
                    RuleVersionId { jurisdiction: jid(), sequence: 2 },
                    date(2026, 7, 1),
                    later,
                    Timestamp::now(),
                )
                .unwrap(),
            ),
        ];
        RuleHistory {
            jurisdiction,
            versions,
        }
    }

    #[test]
    fn history_resolves_effective_version() {
        let h = history();
        assert!(h.effective_at(date(2019, 12, 31)).is_none());
        assert_eq!(h.effective_at(date(2026, 6, 30)).unwrap().version_id.sequence, 1);
        assert_eq!(h.effective_at(date(2026, 7, 1)).unwrap().version_id.sequence, 2);
        assert_eq!(h.earliest().unwrap().version_id.sequence, 1);
    }

    #[test]
    fn history_next_effective_after() {
        let h = history();
        assert_eq!(h.next_effective_after(date(2026, 1, 1)), Some(date(2026, 7, 1)));
        assert_eq!(h.next_effective_after(date(2026, 7, 1)), None);
    }

    #[test]
    fn compact_override_takes_effect_with_version() {
        let h = history();
        assert!(h.profile_at(date(2025, 1, 1)).imlc_member);
        assert!(!h.profile_at(date(2026, 7, 1)).imlc_member);
    }
}

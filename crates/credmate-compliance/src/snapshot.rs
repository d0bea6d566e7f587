//! # Compliance Snapshot
//!
//! The evaluator's output for one license as of one date. Snapshots are
//! never mutated. `snapshot_id` is the SHA-256 digest of the canonical
//! snapshot body with `snapshot_id` and `computed_at` removed, so two
//! evaluations of identical inputs produce the same identifier.

use chrono::NaiveDate;
use credmate_core::{
    sha256_digest, ActivityId, CanonicalBytes, ContentDigest, CreditHours, JurisdictionId,
    LicenseId, Timestamp, Topic,
};
use credmate_ledger::LicenseStatus;
use credmate_rules::{QuotaUnit, Recurrence, RuleVersionId};
use serde::{Deserialize, Serialize};

use crate::error::EvaluationError;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Overall compliance status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceStatus {
    /// Requirements met, or the cycle is still open and on track.
    Compliant,
    /// The cycle is open and the shortfall is unlikely to close in time.
    /// Always carries an advisory basis.
    AtRisk,
    /// The cycle ended short and a practice-allowed grace window is open.
    GracePeriod,
    /// The cycle ended short with no practice-allowed grace remaining.
    NonCompliant,
}

impl ComplianceStatus {
    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compliant => "compliant",
            Self::AtRisk => "at_risk",
            Self::GracePeriod => "grace_period",
            Self::NonCompliant => "non_compliant",
        }
    }

    /// Ordering from best (0) to worst (3).
    pub fn severity(&self) -> u8 {
        match self {
            Self::Compliant => 0,
            Self::AtRisk => 1,
            Self::GracePeriod => 2,
            Self::NonCompliant => 3,
        }
    }
}

impl std::fmt::Display for ComplianceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a status is a mechanical determination or a heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusBasis {
    /// Computed directly from encoded rules.
    Determined,
    /// Derived from the pace heuristic. Not a compliance determination.
    Advisory,
}

// ---------------------------------------------------------------------------
// Window and standings
// ---------------------------------------------------------------------------

/// The cycle window an evaluation used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleWindow {
    /// First day of the window.
    pub start: NaiveDate,
    /// First day after the window.
    pub end: NaiveDate,
    /// Whether this is the license's first cycle.
    pub first_cycle: bool,
    /// Configured cycle length.
    pub cycle_length_months: u32,
    /// Whole months from `start` to `end`, rounding partial months up.
    pub months_remaining: u32,
    /// Whether the total threshold was reduced for a partial cycle.
    pub prorated: bool,
    /// The threshold before proration.
    pub full_required_hours: CreditHours,
}

/// Progress against one topic quota.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "unit", rename_all = "snake_case")]
pub enum TopicProgress {
    /// Measured in weighted hours.
    Hours {
        /// Required hours.
        required: CreditHours,
        /// Qualifying hours accumulated.
        accumulated: CreditHours,
        /// Remaining hours, never negative.
        short: CreditHours,
    },
    /// Measured in activity count.
    Count {
        /// Required activities.
        required: u32,
        /// Qualifying activities accumulated.
        accumulated: u32,
        /// Remaining activities, never negative.
        short: u32,
    },
}

impl TopicProgress {
    /// Whether any requirement remains.
    pub fn is_short(&self) -> bool {
        match self {
            Self::Hours { short, .. } => !short.is_zero(),
            Self::Count { short, .. } => *short > 0,
        }
    }

    /// The unit of the quota.
    pub fn unit(&self) -> QuotaUnit {
        match self {
            Self::Hours { .. } => QuotaUnit::Hours,
            Self::Count { .. } => QuotaUnit::Count,
        }
    }

    /// The shortfall rendered in its unit, e.g. `"1.50"` or `"1"`.
    pub fn short_display(&self) -> String {
        match self {
            Self::Hours { short, .. } => short.to_string(),
            Self::Count { short, .. } => short.to_string(),
        }
    }
}

/// Standing on one topic quota.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicStanding {
    /// The topic.
    pub topic: Topic,
    /// Per-cycle or one-time.
    pub recurrence: Recurrence,
    /// Required, accumulated and short.
    #[serde(flatten)]
    pub progress: TopicProgress,
}

/// An open grace window after the cycle ended short.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraceStanding {
    /// First day after the grace window.
    pub ends_on: NaiveDate,
    /// Whether practice continues during grace.
    pub practice_allowed: bool,
}

// ---------------------------------------------------------------------------
// Advisories and exclusions
// ---------------------------------------------------------------------------

/// Machine-readable advisory category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvisoryKind {
    /// The license's cycle start predates the earliest rule version.
    InconsistentCycleStart,
    /// No version was effective on the as-of date; the earliest was used.
    RuleVersionFallback,
    /// A claimed activity's credit type is not accepted by the governing
    /// version.
    CreditTypeNotAccepted,
    /// The licensee's observed completion rate will not close the gap.
    PaceBehind,
    /// A topic quota remains open close to the end of the cycle.
    TopicPending,
    /// An external verification source reports a different status.
    ExternalStatusMismatch,
}

impl AdvisoryKind {
    /// Whether the advisory marks the snapshot as degraded.
    pub fn degrades(&self) -> bool {
        matches!(self, Self::InconsistentCycleStart | Self::RuleVersionFallback)
    }
}

/// A note attached to a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advisory {
    /// Category.
    pub kind: AdvisoryKind,
    /// Human-readable explanation.
    pub reason: String,
}

impl Advisory {
    pub(crate) fn new(kind: AdvisoryKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }
}

/// Why a claimed activity contributed nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    /// Replaced by a correction.
    Superseded,
    /// Completed by someone other than the license holder.
    DifferentLicensee,
    /// Completed after the evaluation date.
    CompletedAfterAsOf,
    /// Completed outside the cycle window and matches no one-time quota.
    OutsideWindow,
    /// Credit type not accepted by the governing version.
    CreditTypeNotAccepted,
}

/// A claimed activity that did not count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludedActivity {
    /// The activity.
    pub activity_id: ActivityId,
    /// Category.
    pub reason: ExclusionReason,
    /// Human-readable explanation.
    pub detail: String,
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// The outcome of evaluating one license as of one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceSnapshot {
    /// Digest of every other field except `computed_at`.
    pub snapshot_id: ContentDigest,
    /// The evaluated license.
    pub license_id: LicenseId,
    /// Its jurisdiction.
    pub jurisdiction_id: JurisdictionId,
    /// The rule version applied.
    pub rule_version_id: RuleVersionId,
    /// Digest of that rule version's content.
    pub rule_version_digest: ContentDigest,
    /// The evaluation date.
    pub as_of: NaiveDate,
    /// When the evaluation ran.
    pub computed_at: Timestamp,
    /// The cycle window used.
    pub window: CycleWindow,
    /// Total hours required after proration.
    pub required_hours: CreditHours,
    /// Weighted qualifying hours in the window.
    pub accumulated_hours: CreditHours,
    /// Remaining hours, never negative.
    pub hours_short: CreditHours,
    /// Per-topic standings in quota order.
    pub topics: Vec<TopicStanding>,
    /// Overall status.
    pub status: ComplianceStatus,
    /// Whether the status is determined or advisory.
    pub status_basis: StatusBasis,
    /// Open grace window, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grace: Option<GraceStanding>,
    /// Whether the physician may practice under this license.
    pub practice_authorized: bool,
    /// Whether the evaluation relied on a fallback.
    pub degraded: bool,
    /// Notes for the reader.
    #[serde(default)]
    pub advisories: Vec<Advisory>,
    /// The license's own status at evaluation time.
    pub license_status: LicenseStatus,
    /// Activities that counted toward the total or a topic.
    #[serde(default)]
    pub counted_activities: Vec<ActivityId>,
    /// Claimed activities that counted toward nothing.
    #[serde(default)]
    pub excluded_activities: Vec<ExcludedActivity>,
    /// Earliest open board-audit response deadline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_response_due: Option<NaiveDate>,
}

impl ComplianceSnapshot {
    /// Recompute the content digest from the snapshot body.
    pub fn content_digest(&self) -> Result<ContentDigest, EvaluationError> {
        let mut body = serde_json::to_value(self).map_err(|e| EvaluationError::Digest(e.to_string()))?;
        if let Some(obj) = body.as_object_mut() {
            obj.remove("snapshot_id");
            obj.remove("computed_at");
        }
        Ok(sha256_digest(&CanonicalBytes::new(&body)?))
    }

    /// Whether `snapshot_id` matches the body.
    pub fn verify_id(&self) -> bool {
        self.content_digest()
            .map(|d| d == self.snapshot_id)
            .unwrap_or(false)
    }

    /// Topics with a remaining shortfall.
    pub fn short_topics(&self) -> impl Iterator<Item = &TopicStanding> {
        self.topics.iter().filter(|t| t.progress.is_short())
    }

    /// Whether every hour and topic requirement is met.
    pub fn requirements_met(&self) -> bool {
        self.hours_short.is_zero() && self.short_topics().next().is_none()
    }

    /// Whether the advisories include `kind`.
    pub fn has_advisory(&self, kind: AdvisoryKind) -> bool {
        self.advisories.iter().any(|a| a.kind == kind)
    }
}

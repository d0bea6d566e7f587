//! # Notification Decisions
//!
//! [`decide`] compares the previous snapshot with the current one and
//! returns the intents worth telling someone about. It only reports
//! transitions: evaluating an unchanged license twice yields nothing.
//!
//! Delivery is not handled here. Intents are wrapped in [`Notification`]s
//! and queued in the [`NotificationOutbox`], which the transport drains.

use std::collections::{HashSet, VecDeque};

use chrono::NaiveDate;
use credmate_compliance::{AdvisoryKind, ComplianceSnapshot, ComplianceStatus};
use credmate_core::{ContentDigest, LicenseId, Timestamp, Topic};
use credmate_rules::QuotaUnit;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::scheduler::ReminderConfig;

/// How urgently an intent needs attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Which deadline a reminder refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadlineKind {
    /// End of the renewal cycle.
    CycleEnd,
    /// Board-audit response due date.
    AuditResponse,
}

impl DeadlineKind {
    fn as_str(&self) -> &'static str {
        match self {
            Self::CycleEnd => "cycle_end",
            Self::AuditResponse => "audit_response",
        }
    }
}

/// Something that changed and is worth telling the licensee or a reviewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationIntent {
    StatusChanged {
        /// `None` for the first evaluation of a license.
        from: Option<ComplianceStatus>,
        to: ComplianceStatus,
    },
    GracePeriodEntered {
        ends_on: NaiveDate,
        practice_allowed: bool,
    },
    PracticeAuthorizationLost,
    PracticeAuthorizationRestored,
    TopicShortfallIdentified {
        topic: Topic,
        units_short: String,
        unit: QuotaUnit,
    },
    RequirementsMet,
    DeadlineApproaching {
        deadline: NaiveDate,
        kind: DeadlineKind,
        days_remaining: i64,
        /// The reminder threshold that was crossed.
        threshold_days: u32,
    },
    DegradedEvaluation {
        reason: String,
    },
    ExternalStatusMismatch {
        reason: String,
    },
}

impl NotificationIntent {
    /// Severity of the intent.
    pub fn severity(&self) -> Severity {
        match self {
            Self::StatusChanged { to, .. } => match to {
                ComplianceStatus::Compliant => Severity::Info,
                ComplianceStatus::AtRisk | ComplianceStatus::GracePeriod => Severity::Warning,
                ComplianceStatus::NonCompliant => Severity::Critical,
            },
            Self::GracePeriodEntered {
                practice_allowed, ..
            } => {
                if *practice_allowed {
                    Severity::Warning
                } else {
                    Severity::Critical
                }
            }
            Self::PracticeAuthorizationLost => Severity::Critical,
            Self::PracticeAuthorizationRestored | Self::RequirementsMet => Severity::Info,
            Self::TopicShortfallIdentified { .. }
            | Self::DegradedEvaluation { .. }
            | Self::ExternalStatusMismatch { .. } => Severity::Warning,
            Self::DeadlineApproaching { days_remaining, .. } => match days_remaining {
                d if *d <= 7 => Severity::Critical,
                d if *d <= 30 => Severity::Warning,
                _ => Severity::Info,
            },
        }
    }

    /// Human-readable message.
    pub fn message(&self) -> String {
        match self {
            Self::StatusChanged { from: None, to } => {
                format!("compliance status is {to}")
            }
            Self::StatusChanged { from: Some(from), to } => {
                format!("compliance status changed from {from} to {to}")
            }
            Self::GracePeriodEntered {
                ends_on,
                practice_allowed: true,
            } => format!(
                "CME requirements were not met by the end of the cycle; practice may continue during the grace period ending {ends_on}"
            ),
            Self::GracePeriodEntered {
                ends_on,
                practice_allowed: false,
            } => format!(
                "CME requirements were not met by the end of the cycle; practice is barred until they are cured, no later than {ends_on}"
            ),
            Self::PracticeAuthorizationLost => "practice is no longer authorized".into(),
            Self::PracticeAuthorizationRestored => "practice authorization restored".into(),
            Self::TopicShortfallIdentified {
                topic,
                units_short,
                unit,
            } => format!("{units_short} {unit} of {topic} still required"),
            Self::RequirementsMet => "all CME requirements for the cycle are met".into(),
            Self::DeadlineApproaching {
                deadline,
                kind: DeadlineKind::CycleEnd,
                days_remaining,
                ..
            } => format!(
                "the renewal cycle ends on {deadline} ({days_remaining} days) with requirements still open"
            ),
            Self::DeadlineApproaching {
                deadline,
                kind: DeadlineKind::AuditResponse,
                days_remaining,
                ..
            } => format!("the board audit response is due on {deadline} ({days_remaining} days)"),
            Self::DegradedEvaluation { reason } => {
                format!("evaluation used fallback rules: {reason}")
            }
            Self::ExternalStatusMismatch { reason } => reason.clone(),
        }
    }

    /// Key identifying the intent within one license cycle. Two intents
    /// with the same key are the same news.
    pub fn dedupe_key(&self) -> String {
        match self {
            Self::StatusChanged { from, to } => format!(
                "status:{}->{}",
                from.map(|s| s.as_str()).unwrap_or("none"),
                to.as_str()
            ),
            Self::GracePeriodEntered { ends_on, .. } => format!("grace:{ends_on}"),
            Self::PracticeAuthorizationLost => "practice:lost".into(),
            Self::PracticeAuthorizationRestored => "practice:restored".into(),
            Self::TopicShortfallIdentified {
                topic, units_short, ..
            } => format!("topic:{topic}:{units_short}"),
            Self::RequirementsMet => "requirements_met".into(),
            Self::DeadlineApproaching {
                deadline,
                kind,
                threshold_days,
                ..
            } => format!("deadline:{}:{deadline}:{threshold_days}", kind.as_str()),
            Self::DegradedEvaluation { reason } => format!("degraded:{reason}"),
            Self::ExternalStatusMismatch { reason } => format!("mismatch:{reason}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// Intents implied by moving from `previous` to `current`, using the
/// default reminder thresholds.
pub fn decide(
    previous: Option<&ComplianceSnapshot>,
    current: &ComplianceSnapshot,
) -> Vec<NotificationIntent> {
    decide_with(previous, current, &ReminderConfig::default())
}

/// [`decide`] with explicit reminder thresholds.
pub fn decide_with(
    previous: Option<&ComplianceSnapshot>,
    current: &ComplianceSnapshot,
    reminders: &ReminderConfig,
) -> Vec<NotificationIntent> {
    let mut intents = Vec::new();
    // A renewal starts a new cycle; per-cycle news is compared only
    // against a snapshot of the same cycle.
    let same_cycle = previous.filter(|p| p.window.start == current.window.start);

    if previous.map(|p| p.status) != Some(current.status) {
        intents.push(NotificationIntent::StatusChanged {
            from: previous.map(|p| p.status),
            to: current.status,
        });
    }

    if let Some(grace) = current.grace {
        if same_cycle.and_then(|p| p.grace) != Some(grace) {
            intents.push(NotificationIntent::GracePeriodEntered {
                ends_on: grace.ends_on,
                practice_allowed: grace.practice_allowed,
            });
        }
    }

    match (previous.map(|p| p.practice_authorized), current.practice_authorized) {
        (Some(true) | None, false) => intents.push(NotificationIntent::PracticeAuthorizationLost),
        (Some(false), true) => intents.push(NotificationIntent::PracticeAuthorizationRestored),
        _ => {}
    }

    for standing in current.short_topics() {
        let was_short = same_cycle
            .and_then(|p| {
                p.topics
                    .iter()
                    .find(|t| t.topic == standing.topic && t.recurrence == standing.recurrence)
            })
            .is_some_and(|t| t.progress.is_short());
        if !was_short {
            intents.push(NotificationIntent::TopicShortfallIdentified {
                topic: standing.topic.clone(),
                units_short: standing.progress.short_display(),
                unit: standing.progress.unit(),
            });
        }
    }

    if current.requirements_met() {
        if let Some(prev) = previous {
            if !prev.requirements_met() || same_cycle.is_none() {
                intents.push(NotificationIntent::RequirementsMet);
            }
        }
    } else if current.as_of < current.window.end {
        if let Some(intent) = crossed_threshold(
            same_cycle.map(|p| p.as_of),
            current.as_of,
            current.window.end,
            DeadlineKind::CycleEnd,
            reminders,
        ) {
            intents.push(intent);
        }
    }

    if let Some(due) = current.audit_response_due {
        let prev_as_of = previous
            .filter(|p| p.audit_response_due == Some(due))
            .map(|p| p.as_of);
        if let Some(intent) = crossed_threshold(
            prev_as_of,
            current.as_of,
            due,
            DeadlineKind::AuditResponse,
            reminders,
        ) {
            intents.push(intent);
        }
    }

    if let Some(reason) = degraded_reason(current) {
        if previous.and_then(degraded_reason).as_ref() != Some(&reason) {
            intents.push(NotificationIntent::DegradedEvaluation { reason });
        }
    }

    for advisory in current
        .advisories
        .iter()
        .filter(|a| a.kind == AdvisoryKind::ExternalStatusMismatch)
    {
        let already = previous.is_some_and(|p| p.advisories.contains(advisory));
        if !already {
            intents.push(NotificationIntent::ExternalStatusMismatch {
                reason: advisory.reason.clone(),
            });
        }
    }

    intents
}

fn degraded_reason(snapshot: &ComplianceSnapshot) -> Option<String> {
    if !snapshot.degraded {
        return None;
    }
    let reasons: Vec<&str> = snapshot
        .advisories
        .iter()
        .filter(|a| a.kind.degrades())
        .map(|a| a.reason.as_str())
        .collect();
    Some(reasons.join("; "))
}

/// A reminder intent when the days remaining crossed a threshold since the
/// previous evaluation.
fn crossed_threshold(
    previous_as_of: Option<NaiveDate>,
    as_of: NaiveDate,
    deadline: NaiveDate,
    kind: DeadlineKind,
    reminders: &ReminderConfig,
) -> Option<NotificationIntent> {
    if as_of >= deadline {
        return None;
    }
    let days_remaining = (deadline - as_of).num_days();
    let reached = reminders.threshold_reached(days_remaining)?;
    let before = previous_as_of
        .filter(|p| *p < deadline)
        .and_then(|p| reminders.threshold_reached((deadline - p).num_days()));
    if before == Some(reached) {
        return None;
    }
    Some(NotificationIntent::DeadlineApproaching {
        deadline,
        kind,
        days_remaining,
        threshold_days: reached,
    })
}

// ---------------------------------------------------------------------------
// Outbox
// ---------------------------------------------------------------------------

/// An intent queued for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Monotonic outbox sequence.
    pub sequence: u64,
    /// The license concerned.
    pub license_id: LicenseId,
    /// The snapshot that produced the intent.
    pub snapshot_id: ContentDigest,
    /// Sequence of that snapshot's entry in the license history.
    pub history_sequence: u64,
    /// What happened.
    pub intent: NotificationIntent,
    /// How urgent.
    pub severity: Severity,
    /// Human-readable text.
    pub message: String,
    /// License, cycle, history entry and intent key.
    pub dedupe_key: String,
    /// When it was queued.
    pub created_at: Timestamp,
}

#[derive(Debug, Default)]
struct OutboxInner {
    next_sequence: u64,
    pending: VecDeque<Notification>,
    pending_keys: HashSet<String>,
}

/// Pending notifications awaiting delivery.
///
/// Each recorded history entry contributes its intents once: pushing the
/// same entry again while its notifications are pending is a no-op. A
/// later entry with the same news (a second suspension in one cycle, say)
/// is a new transition and is queued. Keys are released on drain.
#[derive(Debug, Default)]
pub struct NotificationOutbox {
    inner: Mutex<OutboxInner>,
}

impl NotificationOutbox {
    /// An empty outbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the intents produced for `snapshot`, recorded as history
    /// entry `history_sequence`. Returns the newly queued notifications;
    /// duplicates are dropped.
    pub fn push(
        &self,
        snapshot: &ComplianceSnapshot,
        history_sequence: u64,
        intents: Vec<NotificationIntent>,
        now: Timestamp,
    ) -> Vec<Notification> {
        let mut inner = self.inner.lock();
        let mut queued = Vec::new();
        for intent in intents {
            let dedupe_key = format!(
                "{}:{}:{}:{}",
                snapshot.license_id,
                snapshot.window.start,
                history_sequence,
                intent.dedupe_key()
            );
            if !inner.pending_keys.insert(dedupe_key.clone()) {
                tracing::debug!(license_id = %snapshot.license_id, %dedupe_key, "duplicate notification dropped");
                continue;
            }
            inner.next_sequence += 1;
            let notification = Notification {
                sequence: inner.next_sequence,
                license_id: snapshot.license_id,
                snapshot_id: snapshot.snapshot_id.clone(),
                history_sequence,
                severity: intent.severity(),
                message: intent.message(),
                intent,
                dedupe_key,
                created_at: now,
            };
            inner.pending.push_back(notification.clone());
            queued.push(notification);
        }
        queued
    }

    /// Pending notifications for one license, oldest first.
    pub fn pending(&self, license_id: LicenseId) -> Vec<Notification> {
        self.inner
            .lock()
            .pending
            .iter()
            .filter(|n| n.license_id == license_id)
            .cloned()
            .collect()
    }

    /// Remove and return every pending notification.
    pub fn drain(&self) -> Vec<Notification> {
        let mut inner = self.inner.lock();
        inner.pending_keys.clear();
        inner.pending.drain(..).collect()
    }

    /// Number of pending notifications.
    pub fn len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().pending.is_empty()
    }
}

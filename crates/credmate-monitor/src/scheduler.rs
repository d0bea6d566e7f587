//! # Deadline Scheduler
//!
//! Decides when each license must next be re-evaluated, and keeps one
//! pending entry per license.
//!
//! The next evaluation date is the earliest of these dates that falls
//! strictly after the snapshot's `as_of`:
//!
//! - the cycle end,
//! - the grace window end,
//! - the next scheduled rule version's `effective_from`,
//! - each reminder date before the cycle end (90, 30 and 7 days by default),
//! - the earliest open board-audit response deadline.
//!
//! Ledger and rule writes call [`EvaluationSchedule::invalidate`], which
//! makes the license due immediately.

use std::collections::BTreeMap;

use chrono::{Days, NaiveDate};
use credmate_compliance::{grace_end, ComplianceSnapshot};
use credmate_core::{LicenseId, Timestamp};
use credmate_rules::RuleHistory;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Reminder thresholds before a deadline, in days.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReminderConfig {
    /// Days before the deadline at which a reminder is due.
    pub days_before: Vec<u32>,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            days_before: vec![90, 30, 7],
        }
    }
}

impl ReminderConfig {
    /// The tightest threshold that `days_remaining` has reached, if any.
    pub fn threshold_reached(&self, days_remaining: i64) -> Option<u32> {
        self.days_before
            .iter()
            .copied()
            .filter(|d| days_remaining <= i64::from(*d))
            .min()
    }
}

// ---------------------------------------------------------------------------
// Deadlines
// ---------------------------------------------------------------------------

/// Why a license is scheduled for evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScheduleReason {
    /// The cycle window ends.
    CycleEnd,
    /// The grace window ends.
    GraceEnd,
    /// A new rule version takes effect.
    RuleChange,
    /// A reminder threshold before the cycle end.
    Reminder {
        /// Days before the cycle end.
        days_before: u32,
    },
    /// A board-audit response is due.
    AuditResponseDue,
    /// A ledger or rule write affected the license.
    Invalidated,
    /// A previous attempt failed.
    Retry,
}

/// One upcoming date that requires re-evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledDeadline {
    /// The date.
    pub date: NaiveDate,
    /// Why it matters.
    pub reason: ScheduleReason,
}

/// Every date after `snapshot.as_of` at which the snapshot may go stale,
/// earliest first.
pub fn upcoming_deadlines(
    snapshot: &ComplianceSnapshot,
    rules: &RuleHistory,
    reminders: &ReminderConfig,
) -> Vec<ScheduledDeadline> {
    let end = snapshot.window.end;
    let mut candidates = vec![ScheduledDeadline {
        date: end,
        reason: ScheduleReason::CycleEnd,
    }];

    let grace = snapshot.grace.map(|g| g.ends_on).or_else(|| {
        rules
            .versions
            .iter()
            .find(|v| v.version_id == snapshot.rule_version_id)
            .and_then(|v| grace_end(end, &v.rules.grace_policy))
    });
    if let Some(date) = grace {
        candidates.push(ScheduledDeadline {
            date,
            reason: ScheduleReason::GraceEnd,
        });
    }

    if let Some(date) = rules.next_effective_after(snapshot.as_of) {
        candidates.push(ScheduledDeadline {
            date,
            reason: ScheduleReason::RuleChange,
        });
    }

    for days_before in &reminders.days_before {
        if let Some(date) = end.checked_sub_days(Days::new(u64::from(*days_before))) {
            candidates.push(ScheduledDeadline {
                date,
                reason: ScheduleReason::Reminder {
                    days_before: *days_before,
                },
            });
        }
    }

    if let Some(date) = snapshot.audit_response_due {
        candidates.push(ScheduledDeadline {
            date,
            reason: ScheduleReason::AuditResponseDue,
        });
    }

    candidates.retain(|c| c.date > snapshot.as_of);
    candidates.sort_by_key(|c| c.date);
    candidates.dedup_by_key(|c| c.date);
    candidates
}

/// The earliest upcoming deadline, or `None` when nothing can change the
/// snapshot short of a ledger or rule write.
pub fn next_evaluation_date(
    snapshot: &ComplianceSnapshot,
    rules: &RuleHistory,
    reminders: &ReminderConfig,
) -> Option<ScheduledDeadline> {
    upcoming_deadlines(snapshot, rules, reminders).into_iter().next()
}

// ---------------------------------------------------------------------------
// EvaluationSchedule
// ---------------------------------------------------------------------------

/// Lifecycle of a schedule entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// Waiting for its due date.
    Pending,
    /// The last attempt failed; due again on `due_on`.
    Failed,
}

/// One license's pending evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    /// The license.
    pub license_id: LicenseId,
    /// When it is due.
    pub due_on: NaiveDate,
    /// Why.
    pub reason: ScheduleReason,
    /// Pending or failed.
    pub status: EntryStatus,
    /// Consecutive failed attempts.
    pub attempts: u32,
    /// Error from the last failed attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// When the entry was last written.
    pub scheduled_at: Timestamp,
}

impl ScheduleEntry {
    /// Whether the entry is due on `as_of`.
    pub fn is_due(&self, as_of: NaiveDate) -> bool {
        self.due_on <= as_of
    }
}

/// One pending entry per license.
#[derive(Debug, Default)]
pub struct EvaluationSchedule {
    entries: RwLock<BTreeMap<LicenseId, ScheduleEntry>>,
}

impl EvaluationSchedule {
    /// An empty schedule.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a license's entry after a successful evaluation. `None`
    /// removes the entry.
    pub fn schedule(
        &self,
        license_id: LicenseId,
        next: Option<ScheduledDeadline>,
        now: Timestamp,
    ) {
        let mut entries = self.entries.write();
        match next {
            Some(deadline) => {
                entries.insert(
                    license_id,
                    ScheduleEntry {
                        license_id,
                        due_on: deadline.date,
                        reason: deadline.reason,
                        status: EntryStatus::Pending,
                        attempts: 0,
                        last_error: None,
                        scheduled_at: now,
                    },
                );
            }
            None => {
                entries.remove(&license_id);
            }
        }
    }

    /// Make a license due on `today`.
    pub fn invalidate(&self, license_id: LicenseId, today: NaiveDate, now: Timestamp) {
        let mut entries = self.entries.write();
        let entry = entries.entry(license_id).or_insert_with(|| ScheduleEntry {
            license_id,
            due_on: today,
            reason: ScheduleReason::Invalidated,
            status: EntryStatus::Pending,
            attempts: 0,
            last_error: None,
            scheduled_at: now,
        });
        if entry.due_on > today || entry.reason != ScheduleReason::Invalidated {
            entry.due_on = entry.due_on.min(today);
            entry.reason = ScheduleReason::Invalidated;
            entry.scheduled_at = now;
        }
    }

    /// Record a failed attempt, due again on `retry_on`.
    pub fn record_failure(
        &self,
        license_id: LicenseId,
        error: impl Into<String>,
        retry_on: NaiveDate,
        now: Timestamp,
    ) {
        let mut entries = self.entries.write();
        let entry = entries.entry(license_id).or_insert_with(|| ScheduleEntry {
            license_id,
            due_on: retry_on,
            reason: ScheduleReason::Retry,
            status: EntryStatus::Failed,
            attempts: 0,
            last_error: None,
            scheduled_at: now,
        });
        entry.status = EntryStatus::Failed;
        entry.reason = ScheduleReason::Retry;
        entry.attempts += 1;
        entry.last_error = Some(error.into());
        entry.due_on = retry_on;
        entry.scheduled_at = now;
    }

    /// Licenses due on or before `as_of`, earliest first.
    pub fn due(&self, as_of: NaiveDate) -> Vec<LicenseId> {
        let entries = self.entries.read();
        let mut due: Vec<&ScheduleEntry> = entries.values().filter(|e| e.is_due(as_of)).collect();
        due.sort_by_key(|e| (e.due_on, e.license_id));
        due.into_iter().map(|e| e.license_id).collect()
    }

    /// A license's entry.
    pub fn entry(&self, license_id: LicenseId) -> Option<ScheduleEntry> {
        self.entries.read().get(&license_id).cloned()
    }

    /// Number of scheduled licenses.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether nothing is scheduled.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

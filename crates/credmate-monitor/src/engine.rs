//! # Compliance Engine
//!
//! Wires the rule store, ledger, evaluator, scheduler, notification
//! outbox and snapshot history together.
//!
//! ## Triggers
//!
//! - **Ledger writes.** The API calls [`ComplianceEngine::on_license_changed`]
//!   or [`ComplianceEngine::on_activity_changed`] after a successful write;
//!   affected licenses are re-evaluated synchronously.
//! - **Rule publication.** [`ComplianceEngine::sync_rule_events`] reads new
//!   store events and re-evaluates every license in the jurisdiction.
//! - **Time.** The sweep evaluates whatever [`ComplianceEngine::sweep_candidates`]
//!   returns for the day.
//!
//! Re-evaluation is idempotent: an unchanged snapshot is not appended
//! again and produces no notifications.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{Days, NaiveDate};
use credmate_compliance::{ComplianceSnapshot, ComplianceStatus, EvaluationInput, Evaluator, PaceConfig};
use credmate_core::{ActivityId, Clock, JurisdictionId, LicenseId, Timestamp};
use credmate_ledger::CredentialLedger;
use credmate_rules::{RuleEventKind, RuleStore};
use serde::{Deserialize, Serialize};

use crate::error::MonitorError;
use crate::history::SnapshotHistory;
use crate::notification::{decide_with, Notification, NotificationOutbox};
use crate::scheduler::{next_evaluation_date, EvaluationSchedule, ReminderConfig, ScheduledDeadline};

/// Engine tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Pace heuristic settings.
    pub pace: PaceConfig,
    /// Reminder thresholds.
    pub reminders: ReminderConfig,
    /// Days until a failed license is due again.
    pub retry_after_days: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pace: PaceConfig::default(),
            reminders: ReminderConfig::default(),
            retry_after_days: 1,
        }
    }
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// In-process engine counters.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    evaluations: AtomicU64,
    degraded_evaluations: AtomicU64,
    evaluation_failures: AtomicU64,
    sweep_failures: AtomicU64,
    snapshots_recorded: AtomicU64,
    notifications: AtomicU64,
}

/// Point-in-time copy of [`EngineMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineMetricsSnapshot {
    pub evaluations: u64,
    pub degraded_evaluations: u64,
    pub evaluation_failures: u64,
    pub sweep_failures: u64,
    pub snapshots_recorded: u64,
    pub notifications: u64,
}

impl EngineMetrics {
    /// Current counter values.
    pub fn snapshot(&self) -> EngineMetricsSnapshot {
        EngineMetricsSnapshot {
            evaluations: self.evaluations.load(Ordering::Relaxed),
            degraded_evaluations: self.degraded_evaluations.load(Ordering::Relaxed),
            evaluation_failures: self.evaluation_failures.load(Ordering::Relaxed),
            sweep_failures: self.sweep_failures.load(Ordering::Relaxed),
            snapshots_recorded: self.snapshots_recorded.load(Ordering::Relaxed),
            notifications: self.notifications.load(Ordering::Relaxed),
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluation seam used by the sweep
// ---------------------------------------------------------------------------

/// Something that can re-evaluate one license. The sweep depends on this
/// rather than on [`ComplianceEngine`] directly.
pub trait LicenseEvaluator: Send + Sync + 'static {
    /// Evaluate and record one license as of `as_of`.
    fn evaluate_license(
        &self,
        license_id: LicenseId,
        as_of: NaiveDate,
    ) -> Result<ComplianceStatus, MonitorError>;

    /// Called once a license has exhausted its attempts.
    fn record_failure(&self, _license_id: LicenseId, _error: &MonitorError) {}
}

/// Result of [`ComplianceEngine::evaluate_and_record`].
#[derive(Debug, Clone)]
pub struct EvaluationOutcome {
    /// The computed snapshot.
    pub snapshot: ComplianceSnapshot,
    /// Whether it was appended to history (false when identical to the
    /// latest entry).
    pub appended: bool,
    /// Notifications queued as a result.
    pub notifications: Vec<Notification>,
    /// The next scheduled evaluation.
    pub next: Option<ScheduledDeadline>,
}

// ---------------------------------------------------------------------------
// ComplianceEngine
// ---------------------------------------------------------------------------

/// The orchestration root.
pub struct ComplianceEngine {
    rules: Arc<RuleStore>,
    ledger: Arc<CredentialLedger>,
    evaluator: Evaluator,
    config: EngineConfig,
    history: SnapshotHistory,
    schedule: EvaluationSchedule,
    outbox: NotificationOutbox,
    metrics: EngineMetrics,
    clock: Arc<dyn Clock>,
    rule_cursor: AtomicU64,
}

impl std::fmt::Debug for ComplianceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComplianceEngine")
            .field("config", &self.config)
            .field("scheduled", &self.schedule.len())
            .field("pending_notifications", &self.outbox.len())
            .finish()
    }
}

impl ComplianceEngine {
    /// Build an engine over existing stores.
    pub fn new(
        rules: Arc<RuleStore>,
        ledger: Arc<CredentialLedger>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            rules,
            ledger,
            evaluator: Evaluator::new(config.pace),
            config,
            history: SnapshotHistory::new(),
            schedule: EvaluationSchedule::new(),
            outbox: NotificationOutbox::new(),
            metrics: EngineMetrics::default(),
            clock,
            rule_cursor: AtomicU64::new(0),
        }
    }

    pub fn rules(&self) -> &Arc<RuleStore> {
        &self.rules
    }

    pub fn ledger(&self) -> &Arc<CredentialLedger> {
        &self.ledger
    }

    pub fn history(&self) -> &SnapshotHistory {
        &self.history
    }

    pub fn schedule(&self) -> &EvaluationSchedule {
        &self.schedule
    }

    pub fn outbox(&self) -> &NotificationOutbox {
        &self.outbox
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Today according to the engine clock.
    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// Current instant according to the engine clock.
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Evaluate without recording anything.
    pub fn evaluate_at(
        &self,
        license_id: LicenseId,
        as_of: NaiveDate,
    ) -> Result<ComplianceSnapshot, MonitorError> {
        let license = self.ledger.license(license_id)?;
        let activities = self.ledger.claimed_activities(license_id)?;
        let rules = self.rules.history(&license.jurisdiction_id)?;
        let observation = self.ledger.latest_observation(license_id);

        let result = self.evaluator.evaluate(
            &EvaluationInput {
                license: &license,
                activities: &activities,
                rules: &rules,
                observation: observation.as_ref(),
                as_of,
            },
            self.clock.now(),
        );
        self.metrics.evaluations.fetch_add(1, Ordering::Relaxed);
        match result {
            Ok(snapshot) => {
                if snapshot.degraded {
                    self.metrics
                        .degraded_evaluations
                        .fetch_add(1, Ordering::Relaxed);
                }
                Ok(snapshot)
            }
            Err(err) => {
                self.metrics
                    .evaluation_failures
                    .fetch_add(1, Ordering::Relaxed);
                tracing::warn!(%license_id, %as_of, kind = err.kind(), error = %err, "evaluation failed");
                Err(err.into())
            }
        }
    }

    /// Evaluate, append to history, queue notifications and reschedule.
    ///
    /// An `as_of` earlier than the latest recorded snapshot is a
    /// retrospective evaluation: it is recorded in history but neither
    /// notifies nor reschedules.
    pub fn evaluate_and_record(
        &self,
        license_id: LicenseId,
        as_of: NaiveDate,
    ) -> Result<EvaluationOutcome, MonitorError> {
        let snapshot = self.evaluate_at(license_id, as_of)?;
        let previous = self.history.latest(license_id);
        let retrospective = previous.as_ref().is_some_and(|p| as_of < p.as_of);
        let now = self.clock.now();

        let entry = self.history.append(snapshot.clone(), now);
        let appended = entry.is_some();
        if appended {
            self.metrics
                .snapshots_recorded
                .fetch_add(1, Ordering::Relaxed);
        }

        if retrospective {
            return Ok(EvaluationOutcome {
                snapshot,
                appended,
                notifications: Vec::new(),
                next: None,
            });
        }

        let notifications = if let Some(entry) = &entry {
            let intents = decide_with(previous.as_ref(), &snapshot, &self.config.reminders);
            let queued = self.outbox.push(&snapshot, entry.sequence, intents, now);
            self.metrics
                .notifications
                .fetch_add(queued.len() as u64, Ordering::Relaxed);
            queued
        } else {
            Vec::new()
        };

        let rules = self.rules.history(&snapshot.jurisdiction_id)?;
        let next = next_evaluation_date(&snapshot, &rules, &self.config.reminders);
        self.schedule.schedule(license_id, next, now);

        tracing::debug!(
            %license_id,
            %as_of,
            status = %snapshot.status,
            appended,
            notifications = notifications.len(),
            next = ?next.map(|d| d.date),
            "license evaluated"
        );

        Ok(EvaluationOutcome {
            snapshot,
            appended,
            notifications,
            next,
        })
    }

    /// Evaluate and record as of today.
    pub fn reevaluate(&self, license_id: LicenseId) -> Result<EvaluationOutcome, MonitorError> {
        self.evaluate_and_record(license_id, self.today())
    }

    /// The latest recorded snapshot, evaluating today if there is none.
    pub fn latest_or_evaluate(
        &self,
        license_id: LicenseId,
    ) -> Result<ComplianceSnapshot, MonitorError> {
        // Surface LicenseNotFound even when history is empty.
        self.ledger.license(license_id)?;
        match self.history.latest(license_id) {
            Some(snapshot) => Ok(snapshot),
            None => Ok(self.reevaluate(license_id)?.snapshot),
        }
    }

    /// A license record changed. It is made due and re-evaluated now.
    pub fn on_license_changed(
        &self,
        license_id: LicenseId,
    ) -> Result<EvaluationOutcome, MonitorError> {
        self.schedule
            .invalidate(license_id, self.today(), self.clock.now());
        self.reevaluate(license_id)
    }

    /// An activity or its claims changed. Every license that has ever
    /// claimed it is re-evaluated. Failures leave the license due and are
    /// logged.
    pub fn on_activity_changed(&self, activity_id: ActivityId) -> Vec<EvaluationOutcome> {
        let licenses: BTreeSet<LicenseId> = self
            .ledger
            .claims_for_activity(activity_id)
            .into_iter()
            .map(|c| c.license_id)
            .collect();
        self.reevaluate_all(licenses)
    }

    /// A rule version was published for a jurisdiction.
    pub fn on_rules_published(&self, jurisdiction_id: &JurisdictionId) -> Vec<EvaluationOutcome> {
        let licenses: BTreeSet<LicenseId> = self
            .ledger
            .licenses_in_jurisdiction(jurisdiction_id)
            .into_iter()
            .map(|l| l.license_id)
            .collect();
        tracing::info!(
            jurisdiction = %jurisdiction_id,
            licenses = licenses.len(),
            "re-evaluating after rule publication"
        );
        self.reevaluate_all(licenses)
    }

    fn reevaluate_all(&self, licenses: BTreeSet<LicenseId>) -> Vec<EvaluationOutcome> {
        let today = self.today();
        let now = self.clock.now();
        let mut outcomes = Vec::with_capacity(licenses.len());
        for license_id in licenses {
            self.schedule.invalidate(license_id, today, now);
            match self.evaluate_and_record(license_id, today) {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => {
                    tracing::warn!(%license_id, kind = err.kind(), error = %err, "re-evaluation failed; license left due");
                }
            }
        }
        outcomes
    }

    /// Process rule-store events recorded since the last call. Returns the
    /// number of events consumed.
    pub fn sync_rule_events(&self) -> usize {
        let cursor = self.rule_cursor.load(Ordering::SeqCst);
        let events = self.rules.events_since(cursor);
        let Some(last) = events.last().map(|e| e.sequence) else {
            return 0;
        };

        let jurisdictions: BTreeSet<JurisdictionId> = events
            .iter()
            .filter(|e| matches!(e.kind, RuleEventKind::VersionPublished { .. }))
            .map(|e| e.jurisdiction.clone())
            .collect();
        for jurisdiction in &jurisdictions {
            self.on_rules_published(jurisdiction);
        }
        self.rule_cursor.fetch_max(last, Ordering::SeqCst);
        events.len()
    }

    /// Licenses the sweep should evaluate on `as_of`: everything scheduled
    /// on or before the date plus every license never evaluated.
    pub fn sweep_candidates(&self, as_of: NaiveDate) -> Vec<LicenseId> {
        let mut candidates: BTreeSet<LicenseId> = self.schedule.due(as_of).into_iter().collect();
        for license in self.ledger.licenses() {
            if self.history.len(license.license_id) == 0 {
                candidates.insert(license.license_id);
            }
        }
        candidates.into_iter().collect()
    }
}

impl LicenseEvaluator for ComplianceEngine {
    fn evaluate_license(
        &self,
        license_id: LicenseId,
        as_of: NaiveDate,
    ) -> Result<ComplianceStatus, MonitorError> {
        self.evaluate_and_record(license_id, as_of)
            .map(|outcome| outcome.snapshot.status)
    }

    fn record_failure(&self, license_id: LicenseId, error: &MonitorError) {
        self.metrics.sweep_failures.fetch_add(1, Ordering::Relaxed);
        let today = self.today();
        let retry_on = today
            .checked_add_days(Days::new(u64::from(self.config.retry_after_days)))
            .unwrap_or(today);
        self.schedule
            .record_failure(license_id, error.to_string(), retry_on, self.clock.now());
    }
}

//! # Compliance Evaluator
//!
//! A pure function from (license, claimed activities, rule history,
//! latest external observation, as-of date) to a [`ComplianceSnapshot`].
//! The evaluator reads nothing but its input and writes nothing but its
//! output, so it is safe to call from any thread and any number of times.
//!
//! ## Steps
//!
//! 1. Resolve the rule version effective on `as_of`, falling back to the
//!    earliest version (degraded) when `as_of` precedes it.
//! 2. Compute the cycle window and prorated threshold ([`crate::window`]).
//! 3. Filter claimed activities and tally weighted hours and topic units.
//! 4. Compare tallies with thresholds.
//! 5. Derive status, grace standing and practice authorization.
//! 6. Digest the body into `snapshot_id`.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use credmate_core::{ContentDigest, CreditHours, Timestamp};
use credmate_ledger::{CmeActivity, License, StatusObservation};
use credmate_rules::{QuotaMeasure, Recurrence, RuleHistory};
use serde::{Deserialize, Serialize};

use crate::error::EvaluationError;
use crate::pace::PaceConfig;
use crate::snapshot::{
    Advisory, AdvisoryKind, ComplianceSnapshot, ComplianceStatus, ExcludedActivity,
    ExclusionReason, GraceStanding, StatusBasis, TopicProgress, TopicStanding,
};
use crate::window::{cycle_window, grace_end};

/// Everything one evaluation reads.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationInput<'a> {
    /// The license under evaluation.
    pub license: &'a License,
    /// Activities actively claimed toward the license.
    pub activities: &'a [CmeActivity],
    /// The license jurisdiction's full version history.
    pub rules: &'a RuleHistory,
    /// Latest external status report, if any.
    pub observation: Option<&'a StatusObservation>,
    /// Evaluation date.
    pub as_of: NaiveDate,
}

/// The compliance evaluator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluator {
    pace: PaceConfig,
}

#[derive(Default)]
struct Tally {
    hours: CreditHours,
    count: u32,
}

impl Evaluator {
    /// An evaluator with the given pace tuning.
    pub fn new(pace: PaceConfig) -> Self {
        Self { pace }
    }

    /// The pace tuning in use.
    pub fn pace(&self) -> PaceConfig {
        self.pace
    }

    /// Evaluate one license.
    ///
    /// `computed_at` is recorded on the snapshot but excluded from its
    /// digest.
    ///
    /// # Errors
    ///
    /// - [`EvaluationError::NoEffectiveRuleVersion`] if the jurisdiction has
    ///   never published a version.
    /// - [`EvaluationError::JurisdictionMismatch`] if the rule history is
    ///   not the license's jurisdiction.
    pub fn evaluate(
        &self,
        input: &EvaluationInput<'_>,
        computed_at: Timestamp,
    ) -> Result<ComplianceSnapshot, EvaluationError> {
        let license = input.license;
        let as_of = input.as_of;
        let jurisdiction = &input.rules.jurisdiction.id;
        if jurisdiction != &license.jurisdiction_id {
            return Err(EvaluationError::JurisdictionMismatch {
                rules: jurisdiction.clone(),
                license: license.jurisdiction_id.clone(),
            });
        }

        // 1. Rule version.
        let earliest = input
            .rules
            .earliest()
            .ok_or_else(|| EvaluationError::NoEffectiveRuleVersion {
                jurisdiction: jurisdiction.clone(),
                as_of,
            })?;
        let mut advisories = Vec::new();
        let version = match input.rules.effective_at(as_of) {
            Some(version) => version,
            None => {
                advisories.push(Advisory::new(
                    AdvisoryKind::RuleVersionFallback,
                    format!(
                        "no rule version was in effect on {as_of}; evaluated under {} (effective {})",
                        earliest.version_id, earliest.effective_from
                    ),
                ));
                earliest
            }
        };
        let cycle_start = license.cycle_start_on(as_of);
        if cycle_start < earliest.effective_from {
            advisories.push(Advisory::new(
                AdvisoryKind::InconsistentCycleStart,
                format!(
                    "cycle start {cycle_start} predates the earliest encoded rules for {jurisdiction} (effective {}); requirements were evaluated under {}",
                    earliest.effective_from, version.version_id
                ),
            ));
        }
        let rules = &version.rules;

        // 2. Window.
        let (window, required_hours) = cycle_window(license, rules, as_of)?;

        // 3. Filter and tally.
        let mut ordered: Vec<&CmeActivity> = input.activities.iter().collect();
        ordered.sort_by_key(|a| (a.completion_date, a.activity_id));
        ordered.dedup_by_key(|a| a.activity_id);

        let mut accumulated_hours = CreditHours::ZERO;
        let mut tallies: Vec<Tally> = rules.topic_quotas.iter().map(|_| Tally::default()).collect();
        let mut counted = Vec::new();
        let mut excluded = Vec::new();
        let mut unaccepted_types = BTreeSet::new();

        for activity in ordered {
            let exclude = |reason: ExclusionReason, detail: String| ExcludedActivity {
                activity_id: activity.activity_id,
                reason,
                detail,
            };
            if let Some(by) = activity.superseded_by {
                excluded.push(exclude(
                    ExclusionReason::Superseded,
                    format!("superseded by correction {by}"),
                ));
                continue;
            }
            if activity.licensee_id != license.licensee_id {
                excluded.push(exclude(
                    ExclusionReason::DifferentLicensee,
                    "completed by a different licensee".into(),
                ));
                continue;
            }
            if activity.completion_date > as_of {
                excluded.push(exclude(
                    ExclusionReason::CompletedAfterAsOf,
                    format!("completed {} after evaluation date {as_of}", activity.completion_date),
                ));
                continue;
            }
            let Some(weight) = rules.weight_for(&activity.credit_type) else {
                excluded.push(exclude(
                    ExclusionReason::CreditTypeNotAccepted,
                    format!(
                        "{} credit is not accepted under {}",
                        activity.credit_type, version.version_id
                    ),
                ));
                unaccepted_types.insert(activity.credit_type.clone());
                continue;
            };

            let credit = activity.credit_amount.weighted(weight);
            let in_window =
                activity.completion_date >= window.start && activity.completion_date < window.end;
            let mut contributed = false;
            if in_window {
                accumulated_hours += credit;
                contributed = true;
            }
            for (quota, tally) in rules.topic_quotas.iter().zip(tallies.iter_mut()) {
                let eligible = match quota.recurrence {
                    Recurrence::PerCycle => in_window,
                    Recurrence::OneTime => true,
                };
                if eligible && activity.has_topic(&quota.topic) {
                    tally.hours += credit;
                    tally.count += 1;
                    contributed = true;
                }
            }
            if contributed {
                counted.push(activity.activity_id);
            } else {
                excluded.push(exclude(
                    ExclusionReason::OutsideWindow,
                    format!(
                        "completed {} outside the cycle window {} to {}",
                        activity.completion_date, window.start, window.end
                    ),
                ));
            }
        }

        for credit_type in &unaccepted_types {
            advisories.push(Advisory::new(
                AdvisoryKind::CreditTypeNotAccepted,
                format!(
                    "claimed {credit_type} credit does not count toward {jurisdiction} under {}",
                    version.version_id
                ),
            ));
        }

        // 4. Compare.
        let hours_short = required_hours.saturating_sub(accumulated_hours);
        let topics: Vec<TopicStanding> = rules
            .topic_quotas
            .iter()
            .zip(tallies)
            .map(|(quota, tally)| TopicStanding {
                topic: quota.topic.clone(),
                recurrence: quota.recurrence,
                progress: match quota.measure {
                    QuotaMeasure::Hours { required } => TopicProgress::Hours {
                        required,
                        accumulated: tally.hours,
                        short: required.saturating_sub(tally.hours),
                    },
                    QuotaMeasure::Count { required } => TopicProgress::Count {
                        required,
                        accumulated: tally.count,
                        short: required.saturating_sub(tally.count),
                    },
                },
            })
            .collect();

        // 5. Status.
        let short_topics: Vec<&TopicStanding> =
            topics.iter().filter(|t| t.progress.is_short()).collect();
        let short = !hours_short.is_zero() || !short_topics.is_empty();

        let (status, status_basis, grace) = if !short {
            (ComplianceStatus::Compliant, StatusBasis::Determined, None)
        } else if as_of < window.end {
            let mut behind = false;
            if !hours_short.is_zero() {
                if let Some(pace) = self.pace.assess(
                    window.start,
                    window.end,
                    as_of,
                    accumulated_hours,
                    required_hours,
                ) {
                    if pace.behind {
                        behind = true;
                        advisories.push(Advisory::new(
                            AdvisoryKind::PaceBehind,
                            format!(
                                "at the current rate about {} of {} required hours will be complete when the cycle ends on {} ({} days left)",
                                pace.projected, required_hours, window.end, pace.remaining_days
                            ),
                        ));
                    }
                }
            }
            if !short_topics.is_empty() && self.pace.within_lead(as_of, window.end) {
                behind = true;
                let pending: Vec<String> = short_topics
                    .iter()
                    .map(|t| format!("{} ({} {} short)", t.topic, t.progress.short_display(), t.progress.unit()))
                    .collect();
                advisories.push(Advisory::new(
                    AdvisoryKind::TopicPending,
                    format!(
                        "topic requirements still open with the cycle ending {}: {}",
                        window.end,
                        pending.join(", ")
                    ),
                ));
            }
            if behind {
                (ComplianceStatus::AtRisk, StatusBasis::Advisory, None)
            } else {
                (ComplianceStatus::Compliant, StatusBasis::Determined, None)
            }
        } else {
            match grace_end(window.end, &rules.grace_policy) {
                Some(ends_on) if as_of < ends_on => {
                    let practice_allowed = rules.grace_policy.practice_allowed();
                    let status = if practice_allowed {
                        ComplianceStatus::GracePeriod
                    } else {
                        ComplianceStatus::NonCompliant
                    };
                    (
                        status,
                        StatusBasis::Determined,
                        Some(GraceStanding {
                            ends_on,
                            practice_allowed,
                        }),
                    )
                }
                _ => (ComplianceStatus::NonCompliant, StatusBasis::Determined, None),
            }
        };

        let practice_authorized =
            license.status.permits_practice() && status != ComplianceStatus::NonCompliant;

        if let Some(observation) = input.observation {
            if observation.disagrees_with(license.status) {
                advisories.push(Advisory::new(
                    AdvisoryKind::ExternalStatusMismatch,
                    format!(
                        "{} reported the license as {} on {}; the license record says {}",
                        observation.source,
                        observation.reported_status,
                        observation.observed_at.date(),
                        license.status
                    ),
                ));
            }
        }

        let degraded = advisories.iter().any(|a| a.kind.degrades());
        if degraded {
            tracing::warn!(
                license_id = %license.license_id,
                version = %version.version_id,
                %as_of,
                "degraded compliance evaluation"
            );
        }

        // 6. Digest.
        let mut snapshot = ComplianceSnapshot {
            snapshot_id: ContentDigest::sha256([0u8; 32]),
            license_id: license.license_id,
            jurisdiction_id: jurisdiction.clone(),
            rule_version_id: version.version_id.clone(),
            rule_version_digest: version.content_digest.clone(),
            as_of,
            computed_at,
            window,
            required_hours,
            accumulated_hours,
            hours_short,
            topics,
            status,
            status_basis,
            grace,
            practice_authorized,
            degraded,
            advisories,
            license_status: license.status,
            counted_activities: counted,
            excluded_activities: excluded,
            audit_response_due: license.open_audit_due(),
        };
        snapshot.snapshot_id = snapshot.content_digest()?;

        tracing::debug!(
            license_id = %snapshot.license_id,
            status = %snapshot.status,
            short = %snapshot.hours_short,
            "license evaluated"
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use credmate_core::{
        ActivityId, CreditType, JurisdictionId, LicenseNumber, LicenseeId, Topic, Weight,
    };
    use credmate_ledger::{LicenseStatus, NewLicense};
    use credmate_rules::{
        CreditTypeAcceptance, GracePolicy, Jurisdiction, ProrationRule, RuleSet, RuleVersion,
        RuleVersionId, TopicQuota,
    };

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn tx() -> JurisdictionId {
        JurisdictionId::new("US-TX").unwrap()
    }

    fn ruleset(grace: GracePolicy) -> RuleSet {
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
            accepted_credit_types: vec![
                CreditTypeAcceptance {
                    credit_type: CreditType::new("AMA_PRA_1").unwrap(),
                    weight: Weight::ONE,
                },
                CreditTypeAcceptance {
                    credit_type: CreditType::new("AOA_1A").unwrap(),
                    weight: Weight::parse("0.5").unwrap(),
                },
            ],
            grace_policy: grace,
            proration: ProrationRule::MonthsRemaining,
            nominal_cycle_anchor: None,
            compact: None,
            note: None,
            corrects: None,
        }
    }

    fn history(versions: Vec<(NaiveDate, RuleSet)>) -> RuleHistory {
        RuleHistory {
            jurisdiction: Jurisdiction {
                id: tx(),
                name: "Texas Medical Board".into(),
                imlc_member: true,
                principal_licensure_eligible: true,
            },
            versions: versions
                .into_iter()
                .enumerate()
                .map(|(i, (effective, rules))| {
                    Arc::new(
                        RuleVersion::new(
                            RuleVersionId {
                                jurisdiction: tx(),
                                sequence: i as u32 + 1,
                            },
                            effective,
                            rules,
                            Timestamp::start_of(effective),
                        )
                        .unwrap(),
                    )
                })
                .collect(),
        }
    }

    fn license() -> License {
        License::from_request(
            NewLicense {
                licensee_id: LicenseeId::new(),
                jurisdiction_id: tx(),
                license_number: LicenseNumber::new("Q1234").unwrap(),
                issue_date: date(2024, 1, 1),
                cycle_start: None,
                status: None,
            },
            Timestamp::start_of(date(2024, 1, 1)),
        )
        .unwrap()
    }

    fn activity(
        license: &License,
        completed: NaiveDate,
        hours: u64,
        credit_type: &str,
        topics: &[&str],
    ) -> CmeActivity {
        CmeActivity {
            activity_id: ActivityId::new(),
            licensee_id: license.licensee_id,
            title: "Course".into(),
            completion_date: completed,
            credit_amount: CreditHours::from_whole(hours),
            credit_type: CreditType::new(credit_type).unwrap(),
            topics: topics.iter().map(|t| Topic::new(*t).unwrap()).collect(),
            provider_id: None,
            certificate_ref: None,
            recorded_at: Timestamp::start_of(completed),
            supersedes: None,
            superseded_by: None,
            correction_reason: None,
        }
    }

    fn run(
        license: &License,
        activities: &[CmeActivity],
        rules: &RuleHistory,
        as_of: NaiveDate,
    ) -> ComplianceSnapshot {
        Evaluator::default()
            .evaluate(
                &EvaluationInput {
                    license,
                    activities,
                    rules,
                    observation: None,
                    as_of,
                },
                Timestamp::start_of(as_of),
            )
            .unwrap()
    }

    /// 22 hours including 2 hours of ethics.
    fn short_record(license: &License) -> Vec<CmeActivity> {
        vec![
            activity(license, date(2024, 5, 1), 2, "AMA_PRA_1", &["ethics"]),
            activity(license, date(2025, 3, 1), 20, "AMA_PRA_1", &[]),
        ]
    }

    #[test]
    fn elapsed_cycle_without_grace_is_non_compliant() {
        let l = license();
        let h = history(vec![(date(2020, 1, 1), ruleset(GracePolicy::None))]);
        let s = run(&l, &short_record(&l), &h, date(2026, 1, 1));
        assert_eq!(s.status, ComplianceStatus::NonCompliant);
        assert_eq!(s.hours_short, CreditHours::from_whole(18));
        assert!(!s.practice_authorized);
        assert!(s.grace.is_none());
    }

    #[test]
    fn full_record_is_compliant() {
        let l = license();
        let h = history(vec![(date(2020, 1, 1), ruleset(GracePolicy::None))]);
        let mut record = short_record(&l);
        record.push(activity(&l, date(2025, 9, 1), 18, "AMA_PRA_1", &[]));
        let s = run(&l, &record, &h, date(2026, 1, 1));
        assert_eq!(s.status, ComplianceStatus::Compliant);
        assert!(s.requirements_met());
        assert!(s.practice_authorized);
    }

    #[test]
    fn practice_barred_grace_is_non_compliant_with_standing() {
        let l = license();
        let h = history(vec![(
            date(2020, 1, 1),
            ruleset(GracePolicy::PracticeBarred { days: 30 }),
        )]);
        let s = run(&l, &short_record(&l), &h, date(2026, 1, 15));
        assert_eq!(s.status, ComplianceStatus::NonCompliant);
        assert!(!s.practice_authorized);
        assert_eq!(
            s.grace,
            Some(GraceStanding {
                ends_on: date(2026, 1, 31),
                practice_allowed: false,
            })
        );
    }

    #[test]
    fn practice_allowed_grace_keeps_practice() {
        let l = license();
        let h = history(vec![(
            date(2020, 1, 1),
            ruleset(GracePolicy::PracticeAllowed { days: 30 }),
        )]);
        let s = run(&l, &short_record(&l), &h, date(2026, 1, 15));
        assert_eq!(s.status, ComplianceStatus::GracePeriod);
        assert!(s.practice_authorized);
        let after = run(&l, &short_record(&l), &h, date(2026, 1, 31));
        assert_eq!(after.status, ComplianceStatus::NonCompliant);
        assert!(after.grace.is_none());
    }

    #[test]
    fn weights_apply_and_round_down() {
        let l = license();
        let h = history(vec![(date(2020, 1, 1), ruleset(GracePolicy::None))]);
        let mut a = activity(&l, date(2025, 1, 1), 0, "AOA_1A", &[]);
        a.credit_amount = CreditHours::from_hundredths(301);
        let s = run(&l, &[a], &h, date(2025, 2, 1));
        // 3.01 × 0.5 = 1.505, rounded down to 1.50
        assert_eq!(s.accumulated_hours, CreditHours::from_hundredths(150));
    }

    #[test]
    fn unaccepted_and_out_of_window_are_excluded() {
        let l = license();
        let h = history(vec![(date(2020, 1, 1), ruleset(GracePolicy::None))]);
        let record = vec![
            activity(&l, date(2025, 1, 1), 5, "ACCME_OTHER", &[]),
            activity(&l, date(2026, 3, 1), 5, "AMA_PRA_1", &[]),
        ];
        let s = run(&l, &record, &h, date(2026, 6, 1));
        assert_eq!(s.accumulated_hours, CreditHours::ZERO);
        let reasons: Vec<_> = s.excluded_activities.iter().map(|e| e.reason).collect();
        assert!(reasons.contains(&ExclusionReason::CreditTypeNotAccepted));
        assert!(reasons.contains(&ExclusionReason::OutsideWindow));
        assert!(s.has_advisory(AdvisoryKind::CreditTypeNotAccepted));
    }

    #[test]
    fn future_and_superseded_activities_do_not_count() {
        let l = license();
        let h = history(vec![(date(2020, 1, 1), ruleset(GracePolicy::None))]);
        let mut superseded = activity(&l, date(2024, 6, 1), 10, "AMA_PRA_1", &[]);
        superseded.superseded_by = Some(ActivityId::new());
        let later = activity(&l, date(2025, 6, 1), 10, "AMA_PRA_1", &[]);
        let s = run(&l, &[superseded, later], &h, date(2025, 1, 1));
        assert_eq!(s.accumulated_hours, CreditHours::ZERO);
        assert_eq!(s.excluded_activities.len(), 2);
    }

    #[test]
    fn count_and_one_time_quotas() {
        let mut l = license();
        let mut rules = ruleset(GracePolicy::None);
        rules.topic_quotas.push(TopicQuota {
            topic: Topic::new("human_trafficking").unwrap(),
            measure: QuotaMeasure::Count { required: 1 },
            recurrence: Recurrence::OneTime,
        });
        let h = history(vec![(date(2020, 1, 1), rules)]);
        let earlier = activity(&l, date(2024, 3, 1), 1, "AMA_PRA_1", &["human trafficking"]);
        l.renew(date(2026, 1, 1), Timestamp::now()).unwrap();
        let s = run(&l, &[earlier], &h, date(2026, 6, 1));
        let standing = s
            .topics
            .iter()
            .find(|t| t.topic.as_str() == "human_trafficking")
            .unwrap();
        assert_eq!(
            standing.progress,
            TopicProgress::Count {
                required: 1,
                accumulated: 1,
                short: 0
            }
        );
        // The hours belong to the previous cycle.
        assert_eq!(s.accumulated_hours, CreditHours::ZERO);
        assert_eq!(s.counted_activities.len(), 1);
    }

    #[test]
    fn zero_threshold_is_compliant() {
        let l = license();
        let mut rules = ruleset(GracePolicy::None);
        rules.total_hours = CreditHours::ZERO;
        rules.topic_quotas.clear();
        let h = history(vec![(date(2020, 1, 1), rules)]);
        let s = run(&l, &[], &h, date(2027, 1, 1));
        assert_eq!(s.status, ComplianceStatus::Compliant);
        assert!(s.advisories.is_empty());
    }

    #[test]
    fn slow_pace_is_advisory_at_risk() {
        let l = license();
        let h = history(vec![(date(2020, 1, 1), ruleset(GracePolicy::None))]);
        let record = vec![activity(&l, date(2024, 6, 1), 4, "AMA_PRA_1", &["ethics"])];
        let s = run(&l, &record, &h, date(2025, 1, 1));
        assert_eq!(s.status, ComplianceStatus::AtRisk);
        assert_eq!(s.status_basis, StatusBasis::Advisory);
        assert!(s.has_advisory(AdvisoryKind::PaceBehind));
        assert!(s.practice_authorized);
    }

    #[test]
    fn date_before_a_renewal_is_evaluated_in_its_own_cycle() {
        let mut l = license();
        let h = history(vec![(date(2020, 1, 1), ruleset(GracePolicy::None))]);
        let record = short_record(&l);
        let as_of = date(2025, 12, 15);
        let before = run(&l, &record, &h, as_of);

        l.renew(date(2026, 1, 1), Timestamp::start_of(date(2026, 1, 2)))
            .unwrap();
        let after = run(&l, &record, &h, as_of);

        assert_eq!(after.window.start, date(2024, 1, 1));
        assert_eq!(after.window.end, date(2026, 1, 1));
        assert!(after.window.first_cycle);
        assert_eq!(after.accumulated_hours, CreditHours::from_whole(22));
        assert_eq!(after.hours_short, CreditHours::from_whole(18));
        assert_eq!(after.status, ComplianceStatus::AtRisk);
        assert_eq!(after.snapshot_id, before.snapshot_id);

        let renewed = run(&l, &record, &h, date(2026, 2, 1));
        assert_eq!(renewed.window.start, date(2026, 1, 1));
        assert!(renewed.accumulated_hours.is_zero());
    }

    #[test]
    fn early_cycle_shortfall_is_compliant() {
        let l = license();
        let h = history(vec![(date(2020, 1, 1), ruleset(GracePolicy::None))]);
        let s = run(&l, &[], &h, date(2024, 2, 1));
        assert_eq!(s.status, ComplianceStatus::Compliant);
        assert_eq!(s.hours_short, CreditHours::from_whole(40));
    }

    #[test]
    fn never_published_is_fatal() {
        let l = license();
        let h = history(vec![]);
        let err = Evaluator::default()
            .evaluate(
                &EvaluationInput {
                    license: &l,
                    activities: &[],
                    rules: &h,
                    observation: None,
                    as_of: date(2025, 1, 1),
                },
                Timestamp::now(),
            )
            .unwrap_err();
        assert_eq!(err.kind(), "NO_EFFECTIVE_RULE_VERSION");
    }

    #[test]
    fn cycle_start_before_rules_degrades() {
        let l = license();
        let h = history(vec![(date(2025, 1, 1), ruleset(GracePolicy::None))]);
        let s = run(&l, &[], &h, date(2024, 6, 1));
        assert!(s.degraded);
        assert!(s.has_advisory(AdvisoryKind::InconsistentCycleStart));
        assert!(s.has_advisory(AdvisoryKind::RuleVersionFallback));
        assert_eq!(s.rule_version_id.sequence, 1);
    }

    #[test]
    fn external_mismatch_is_advisory_only() {
        let l = license();
        let h = history(vec![(date(2020, 1, 1), ruleset(GracePolicy::None))]);
        let observation = StatusObservation {
            license_id: l.license_id,
            reported_status: LicenseStatus::Suspended,
            source: "board-feed".into(),
            observed_at: Timestamp::start_of(date(2024, 6, 1)),
            detail: None,
        };
        let s = Evaluator::default()
            .evaluate(
                &EvaluationInput {
                    license: &l,
                    activities: &[],
                    rules: &h,
                    observation: Some(&observation),
                    as_of: date(2024, 6, 1),
                },
                Timestamp::now(),
            )
            .unwrap();
        assert!(s.has_advisory(AdvisoryKind::ExternalStatusMismatch));
        assert_eq!(s.license_status, LicenseStatus::Active);
        assert!(s.practice_authorized);
        assert!(!s.degraded);
    }

    #[test]
    fn inactive_license_cannot_practice() {
        let mut l = license();
        l.transition(LicenseStatus::Inactive, "retired", Timestamp::now())
            .unwrap();
        let h = history(vec![(date(2020, 1, 1), ruleset(GracePolicy::None))]);
        let s = run(&l, &[], &h, date(2024, 2, 1));
        assert_eq!(s.status, ComplianceStatus::Compliant);
        assert!(!s.practice_authorized);
    }

    #[test]
    fn jurisdiction_mismatch_is_fatal() {
        let mut l = license();
        l.jurisdiction_id = JurisdictionId::new("US-IN").unwrap();
        let h = history(vec![(date(2020, 1, 1), ruleset(GracePolicy::None))]);
        let err = Evaluator::default()
            .evaluate(
                &EvaluationInput {
                    license: &l,
                    activities: &[],
                    rules: &h,
                    observation: None,
                    as_of: date(2025, 1, 1),
                },
                Timestamp::now(),
            )
            .unwrap_err();
        assert_eq!(err.kind(), "JURISDICTION_MISMATCH");
    }

    #[test]
    fn snapshot_id_ignores_computed_at_and_input_order() {
        let l = license();
        let h = history(vec![(date(2020, 1, 1), ruleset(GracePolicy::None))]);
        let record = short_record(&l);
        let mut reversed = record.clone();
        reversed.reverse();
        let evaluator = Evaluator::default();
        let a = evaluator
            .evaluate(
                &EvaluationInput {
                    license: &l,
                    activities: &record,
                    rules: &h,
                    observation: None,
                    as_of: date(2026, 1, 1),
                },
                Timestamp::start_of(date(2026, 1, 1)),
            )
            .unwrap();
        let b = evaluator
            .evaluate(
                &EvaluationInput {
                    license: &l,
                    activities: &reversed,
                    rules: &h,
                    observation: None,
                    as_of: date(2026, 1, 1),
                },
                Timestamp::start_of(date(2026, 3, 1)),
            )
            .unwrap();
        assert_eq!(a.snapshot_id, b.snapshot_id);
        assert!(a.verify_id());
        assert!(b.verify_id());
    }

    #[test]
    fn open_audit_due_is_carried() {
        let mut l = license();
        l.board_audits.push(credmate_ledger::BoardAudit {
            audit_id: credmate_core::AuditRequestId::new(),
            requested_on: date(2025, 1, 1),
            response_due: date(2025, 3, 1),
            responded_on: None,
            recorded_at: Timestamp::now(),
        });
        let h = history(vec![(date(2020, 1, 1), ruleset(GracePolicy::None))]);
        let s = run(&l, &[], &h, date(2025, 1, 15));
        assert_eq!(s.audit_response_due, Some(date(2025, 3, 1)));
    }
}

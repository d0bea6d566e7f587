//! # CME Compliance Scenarios
//!
//! End-to-end evaluations through the rule store, the credential ledger and
//! the compliance engine. A single jurisdiction requires 40 hours per
//! 24-month cycle including 2 hours of ethics; a license's cycle runs from
//! 2024-01-01 to 2026-01-01. The grace policy varies per scenario.

use std::sync::Arc;

use chrono::NaiveDate;
use credmate_compliance::{
    AdvisoryKind, ComplianceSnapshot, ComplianceStatus, ExclusionReason, TopicProgress,
};
use credmate_core::{
    CreditHours, CreditType, FixedClock, JurisdictionId, LicenseId, LicenseNumber, LicenseeId,
    Topic, Weight,
};
use credmate_ledger::{CredentialLedger, NewActivity, NewLicense};
use credmate_monitor::{ComplianceEngine, EngineConfig};
use credmate_rules::{
    CreditTypeAcceptance, GracePolicy, Jurisdiction, ProrationRule, QuotaMeasure, Recurrence,
    RuleSet, RuleStore, TopicQuota,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn oh() -> JurisdictionId {
    JurisdictionId::new("US-OH").unwrap()
}

fn rules(grace_policy: GracePolicy) -> RuleSet {
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
        grace_policy,
        proration: ProrationRule::MonthsRemaining,
        nominal_cycle_anchor: None,
        compact: None,
        note: None,
        corrects: None,
    }
}

struct Scenario {
    engine: ComplianceEngine,
    licensee_id: LicenseeId,
    license_id: LicenseId,
}

fn scenario(grace_policy: GracePolicy) -> Scenario {
    let clock = Arc::new(FixedClock::at_date(date(2026, 2, 1)));
    let store = Arc::new(RuleStore::with_clock(clock.clone()));
    store
        .register_jurisdiction(Jurisdiction {
            id: oh(),
            name: "State Medical Board of Ohio".into(),
            imlc_member: true,
            principal_licensure_eligible: true,
        })
        .unwrap();
    store
        .publish_rule_version(&oh(), rules(grace_policy), date(2020, 1, 1))
        .unwrap();

    let ledger = Arc::new(CredentialLedger::with_clock(clock.clone()));
    let licensee_id = LicenseeId::new();
    let license = ledger
        .register_license(NewLicense {
            licensee_id,
            jurisdiction_id: oh(),
            license_number: LicenseNumber::new("35.123456").unwrap(),
            issue_date: date(2024, 1, 1),
            cycle_start: None,
            status: None,
        })
        .unwrap();

    Scenario {
        engine: ComplianceEngine::new(store, ledger, clock, EngineConfig::default()),
        licensee_id,
        license_id: license.license_id,
    }
}

impl Scenario {
    fn complete(&self, completed: NaiveDate, hours: u64, topics: &[&str]) {
        let activity = self
            .engine
            .ledger()
            .record_activity(
                self.licensee_id,
                NewActivity {
                    title: "Continuing education".into(),
                    completion_date: completed,
                    credit_amount: CreditHours::from_whole(hours),
                    credit_type: CreditType::new("AMA_PRA_1").unwrap(),
                    topics: topics.iter().map(|t| Topic::new(*t).unwrap()).collect(),
                    provider_id: None,
                    certificate_ref: None,
                },
            )
            .unwrap();
        let version = self
            .engine
            .rules()
            .effective_rule_version(&oh(), completed)
            .unwrap();
        self.engine
            .ledger()
            .claim_activity(activity.activity_id, self.license_id, &version)
            .unwrap();
    }

    fn evaluate(&self, as_of: NaiveDate) -> ComplianceSnapshot {
        self.engine.evaluate_at(self.license_id, as_of).unwrap()
    }
}

fn ethics_short(snapshot: &ComplianceSnapshot) -> CreditHours {
    let standing = snapshot
        .topics
        .iter()
        .find(|t| t.topic.as_str() == "ethics")
        .expect("ethics standing");
    match standing.progress {
        TopicProgress::Hours { short, .. } => short,
        TopicProgress::Count { .. } => panic!("ethics is measured in hours"),
    }
}

// -- Scenario A: hours short at cycle end --------------------------------------

#[test]
fn hours_short_at_cycle_end_is_non_compliant() {
    let s = scenario(GracePolicy::None);
    s.complete(date(2024, 6, 1), 20, &[]);
    s.complete(date(2024, 7, 1), 2, &["ethics"]);

    let snapshot = s.evaluate(date(2026, 1, 1));

    assert_eq!(snapshot.status, ComplianceStatus::NonCompliant);
    assert_eq!(snapshot.accumulated_hours, CreditHours::from_whole(22));
    assert_eq!(snapshot.hours_short, CreditHours::from_whole(18));
    assert!(ethics_short(&snapshot).is_zero());
    assert!(!snapshot.practice_authorized);
    assert!(snapshot.grace.is_none());
    assert_eq!(snapshot.window.end, date(2026, 1, 1));
}

// -- Scenario B: requirements met ----------------------------------------------

#[test]
fn additional_hours_make_the_cycle_compliant() {
    let s = scenario(GracePolicy::None);
    s.complete(date(2024, 6, 1), 20, &[]);
    s.complete(date(2024, 7, 1), 2, &["ethics"]);
    s.complete(date(2024, 9, 1), 20, &[]);

    let snapshot = s.evaluate(date(2026, 1, 1));

    assert_eq!(snapshot.status, ComplianceStatus::Compliant);
    assert!(snapshot.hours_short.is_zero());
    assert!(snapshot.requirements_met());
    assert!(snapshot.practice_authorized);
    assert_eq!(snapshot.counted_activities.len(), 3);
}

// -- Scenario C: practice-barred grace -----------------------------------------

#[test]
fn practice_barred_grace_is_non_compliant() {
    let s = scenario(GracePolicy::PracticeBarred { days: 30 });
    s.complete(date(2024, 6, 1), 33, &[]);
    s.complete(date(2024, 7, 1), 2, &["ethics"]);

    let snapshot = s.evaluate(date(2026, 1, 15));

    assert_eq!(snapshot.hours_short, CreditHours::from_whole(5));
    assert_eq!(snapshot.status, ComplianceStatus::NonCompliant);
    assert!(!snapshot.practice_authorized);
    let grace = snapshot.grace.expect("cure window is open");
    assert!(!grace.practice_allowed);
    assert_eq!(grace.ends_on, date(2026, 1, 31));
}

// -- Scenario D: practice-allowed grace ----------------------------------------

#[test]
fn practice_allowed_grace_keeps_authorization() {
    let s = scenario(GracePolicy::PracticeAllowed { days: 30 });
    s.complete(date(2024, 6, 1), 33, &[]);
    s.complete(date(2024, 7, 1), 2, &["ethics"]);

    let snapshot = s.evaluate(date(2026, 1, 15));

    assert_eq!(snapshot.status, ComplianceStatus::GracePeriod);
    assert!(snapshot.practice_authorized);
    let grace = snapshot.grace.expect("grace window is open");
    assert!(grace.practice_allowed);
}

#[test]
fn grace_window_expiry_is_non_compliant() {
    let s = scenario(GracePolicy::PracticeAllowed { days: 30 });
    s.complete(date(2024, 6, 1), 33, &[]);
    s.complete(date(2024, 7, 1), 2, &["ethics"]);

    let last_day = s.evaluate(date(2026, 1, 30));
    assert_eq!(last_day.status, ComplianceStatus::GracePeriod);

    let expired = s.evaluate(date(2026, 1, 31));
    assert_eq!(expired.status, ComplianceStatus::NonCompliant);
    assert!(expired.grace.is_none());
    assert!(!expired.practice_authorized);
}

// -- Topic shortfall -------------------------------------------------------------

#[test]
fn topic_shortfall_alone_is_non_compliant() {
    let s = scenario(GracePolicy::None);
    s.complete(date(2024, 6, 1), 45, &[]);

    let snapshot = s.evaluate(date(2026, 1, 1));

    assert!(snapshot.hours_short.is_zero());
    assert_eq!(ethics_short(&snapshot), CreditHours::from_whole(2));
    assert_eq!(snapshot.status, ComplianceStatus::NonCompliant);
}

#[test]
fn activities_after_the_cycle_do_not_count() {
    let s = scenario(GracePolicy::PracticeAllowed { days: 30 });
    s.complete(date(2024, 6, 1), 33, &[]);
    s.complete(date(2024, 7, 1), 2, &["ethics"]);
    s.complete(date(2026, 1, 10), 5, &[]);

    let snapshot = s.evaluate(date(2026, 1, 15));

    assert_eq!(snapshot.hours_short, CreditHours::from_whole(5));
    assert_eq!(snapshot.excluded_activities.len(), 1);
    assert_eq!(
        snapshot.excluded_activities[0].reason,
        ExclusionReason::OutsideWindow
    );
}

// -- Degraded evaluation ---------------------------------------------------------

#[test]
fn cycle_start_before_encoded_rules_is_degraded() {
    let clock = Arc::new(FixedClock::at_date(date(2024, 3, 1)));
    let store = Arc::new(RuleStore::with_clock(clock.clone()));
    store
        .register_jurisdiction(Jurisdiction {
            id: oh(),
            name: "State Medical Board of Ohio".into(),
            imlc_member: true,
            principal_licensure_eligible: true,
        })
        .unwrap();
    store
        .publish_rule_version(&oh(), rules(GracePolicy::None), date(2024, 6, 1))
        .unwrap();
    let ledger = Arc::new(CredentialLedger::with_clock(clock.clone()));
    let license = ledger
        .register_license(NewLicense {
            licensee_id: LicenseeId::new(),
            jurisdiction_id: oh(),
            license_number: LicenseNumber::new("35.654321").unwrap(),
            issue_date: date(2024, 1, 1),
            cycle_start: None,
            status: None,
        })
        .unwrap();
    let engine = ComplianceEngine::new(store, ledger, clock, EngineConfig::default());

    let snapshot = engine.evaluate_at(license.license_id, date(2024, 3, 1)).unwrap();

    assert!(snapshot.degraded);
    assert!(snapshot.has_advisory(AdvisoryKind::RuleVersionFallback));
    assert!(snapshot.has_advisory(AdvisoryKind::InconsistentCycleStart));
    assert!(snapshot.advisories.iter().all(|a| !a.reason.is_empty()));
}

#[test]
fn jurisdiction_without_rules_cannot_be_evaluated() {
    let clock = Arc::new(FixedClock::at_date(date(2025, 1, 1)));
    let store = Arc::new(RuleStore::with_clock(clock.clone()));
    store
        .register_jurisdiction(Jurisdiction {
            id: oh(),
            name: "State Medical Board of Ohio".into(),
            imlc_member: false,
            principal_licensure_eligible: false,
        })
        .unwrap();
    let ledger = Arc::new(CredentialLedger::with_clock(clock.clone()));
    let license = ledger
        .register_license(NewLicense {
            licensee_id: LicenseeId::new(),
            jurisdiction_id: oh(),
            license_number: LicenseNumber::new("35.000001").unwrap(),
            issue_date: date(2024, 1, 1),
            cycle_start: None,
            status: None,
        })
        .unwrap();
    let engine = ComplianceEngine::new(store, ledger, clock, EngineConfig::default());

    let err = engine.reevaluate(license.license_id).unwrap_err();

    assert_eq!(err.kind(), "NO_EFFECTIVE_RULE_VERSION");
    assert!(engine.history().latest(license.license_id).is_none());
}

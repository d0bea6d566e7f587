//! # Credential Ledger
//!
//! Thread-safe store of licenses, activities, claims and status
//! observations.
//!
//! ## Locking
//!
//! Each collection has its own `parking_lot::RwLock`. Operations that need
//! more than one acquire them in a fixed order (licenses, activities,
//! claims, observations) and release them before logging.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use credmate_core::{
    ActivityId, AuditRequestId, Clock, JurisdictionId, LicenseId, LicenseeId, SystemClock,
};
use credmate_rules::RuleVersion;
use parking_lot::RwLock;

use crate::activity::{ActivityCorrection, CmeActivity, NewActivity};
use crate::claim::Claim;
use crate::error::LedgerError;
use crate::license::{BoardAudit, License, LicenseStatus, NewLicense};
use crate::observation::StatusObservation;

/// The credential ledger.
pub struct CredentialLedger {
    licenses: RwLock<BTreeMap<LicenseId, License>>,
    activities: RwLock<BTreeMap<ActivityId, CmeActivity>>,
    claims: RwLock<Vec<Claim>>,
    observations: RwLock<BTreeMap<LicenseId, Vec<StatusObservation>>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for CredentialLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialLedger")
            .field("licenses", &self.licenses.read().len())
            .field("activities", &self.activities.read().len())
            .field("claims", &self.claims.read().len())
            .finish()
    }
}

impl Default for CredentialLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialLedger {
    /// An empty ledger on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// An empty ledger on the given clock. The clock decides "today" for
    /// future-date checks and stamps every record.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            licenses: RwLock::new(BTreeMap::new()),
            activities: RwLock::new(BTreeMap::new()),
            claims: RwLock::new(Vec::new()),
            observations: RwLock::new(BTreeMap::new()),
            clock,
        }
    }

    // -- Licenses ---------------------------------------------------------

    /// Register a license.
    ///
    /// # Errors
    ///
    /// [`LedgerError::DuplicateLicense`] when the jurisdiction already has a
    /// license with the same number.
    pub fn register_license(&self, request: NewLicense) -> Result<License, LedgerError> {
        let license = License::from_request(request, self.clock.now())?;
        {
            let mut licenses = self.licenses.write();
            if licenses.values().any(|l| {
                l.jurisdiction_id == license.jurisdiction_id
                    && l.license_number == license.license_number
            }) {
                return Err(LedgerError::DuplicateLicense {
                    jurisdiction: license.jurisdiction_id.clone(),
                    number: license.license_number.to_string(),
                });
            }
            licenses.insert(license.license_id, license.clone());
        }
        tracing::info!(
            license_id = %license.license_id,
            jurisdiction = %license.jurisdiction_id,
            "license registered"
        );
        Ok(license)
    }

    fn update_license<F>(&self, license_id: LicenseId, f: F) -> Result<License, LedgerError>
    where
        F: FnOnce(&mut License) -> Result<(), LedgerError>,
    {
        let mut licenses = self.licenses.write();
        let license = licenses
            .get_mut(&license_id)
            .ok_or(LedgerError::LicenseNotFound(license_id))?;
        let mut updated = license.clone();
        f(&mut updated)?;
        *license = updated.clone();
        Ok(updated)
    }

    /// Start a new renewal cycle.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::RenewalNotAdvancing`] unless the new start is later
    ///   than the current one.
    /// - [`LedgerError::LicenseRevoked`] for revoked licenses.
    pub fn record_renewal(
        &self,
        license_id: LicenseId,
        new_cycle_start: NaiveDate,
    ) -> Result<License, LedgerError> {
        let now = self.clock.now();
        let license = self.update_license(license_id, |l| l.renew(new_cycle_start, now))?;
        tracing::info!(%license_id, cycle_start = %new_cycle_start, "renewal recorded");
        Ok(license)
    }

    /// Move a license to a new lifecycle status.
    pub fn transition_status(
        &self,
        license_id: LicenseId,
        to: LicenseStatus,
        reason: impl Into<String>,
    ) -> Result<License, LedgerError> {
        let reason = reason.into();
        if reason.trim().is_empty() {
            return Err(LedgerError::InvalidLicense(
                "a status change needs a reason".into(),
            ));
        }
        let now = self.clock.now();
        let license = self.update_license(license_id, |l| l.transition(to, reason, now))?;
        tracing::info!(%license_id, status = %to, "license status changed");
        Ok(license)
    }

    /// Record that the board requested CME documentation.
    pub fn record_board_audit(
        &self,
        license_id: LicenseId,
        requested_on: NaiveDate,
        response_due: NaiveDate,
    ) -> Result<BoardAudit, LedgerError> {
        if response_due < requested_on {
            return Err(LedgerError::InvalidLicense(format!(
                "audit response due {response_due} precedes request date {requested_on}"
            )));
        }
        let audit = BoardAudit {
            audit_id: AuditRequestId::new(),
            requested_on,
            response_due,
            responded_on: None,
            recorded_at: self.clock.now(),
        };
        let recorded = audit.clone();
        self.update_license(license_id, move |l| {
            l.board_audits.push(recorded);
            Ok(())
        })?;
        tracing::info!(%license_id, audit_id = %audit.audit_id, %response_due, "board audit recorded");
        Ok(audit)
    }

    /// Record the licensee's response to a board audit.
    pub fn record_audit_response(
        &self,
        license_id: LicenseId,
        audit_id: AuditRequestId,
        responded_on: NaiveDate,
    ) -> Result<BoardAudit, LedgerError> {
        let license = self.update_license(license_id, |l| {
            let audit = l
                .board_audits
                .iter_mut()
                .find(|a| a.audit_id == audit_id)
                .ok_or(LedgerError::AuditNotFound(audit_id))?;
            if audit.responded_on.is_some() {
                return Err(LedgerError::AuditAlreadyResponded(audit_id));
            }
            audit.responded_on = Some(responded_on);
            Ok(())
        })?;
        license
            .board_audits
            .into_iter()
            .find(|a| a.audit_id == audit_id)
            .ok_or(LedgerError::AuditNotFound(audit_id))
    }

    /// Store what an external feed reported about a license.
    pub fn record_status_observation(
        &self,
        observation: StatusObservation,
    ) -> Result<(), LedgerError> {
        let status = self
            .licenses
            .read()
            .get(&observation.license_id)
            .map(|l| l.status)
            .ok_or(LedgerError::LicenseNotFound(observation.license_id))?;
        if observation.disagrees_with(status) {
            tracing::warn!(
                license_id = %observation.license_id,
                reported = %observation.reported_status,
                recorded = %status,
                source = %observation.source,
                "external status disagrees with license record"
            );
        }
        self.observations
            .write()
            .entry(observation.license_id)
            .or_default()
            .push(observation);
        Ok(())
    }

    /// Most recent external observation for a license.
    pub fn latest_observation(&self, license_id: LicenseId) -> Option<StatusObservation> {
        self.observations
            .read()
            .get(&license_id)
            .and_then(|list| list.iter().max_by_key(|o| o.observed_at).cloned())
    }

    /// A license by identifier.
    pub fn license(&self, license_id: LicenseId) -> Result<License, LedgerError> {
        self.licenses
            .read()
            .get(&license_id)
            .cloned()
            .ok_or(LedgerError::LicenseNotFound(license_id))
    }

    /// Every license.
    pub fn licenses(&self) -> Vec<License> {
        self.licenses.read().values().cloned().collect()
    }

    /// Licenses held by one licensee.
    pub fn licenses_for_licensee(&self, licensee_id: LicenseeId) -> Vec<License> {
        self.licenses
            .read()
            .values()
            .filter(|l| l.licensee_id == licensee_id)
            .cloned()
            .collect()
    }

    /// Licenses issued by one jurisdiction.
    pub fn licenses_in_jurisdiction(&self, jurisdiction: &JurisdictionId) -> Vec<License> {
        self.licenses
            .read()
            .values()
            .filter(|l| &l.jurisdiction_id == jurisdiction)
            .cloned()
            .collect()
    }

    // -- Activities -------------------------------------------------------

    /// Record a completed activity for a licensee.
    ///
    /// # Errors
    ///
    /// [`LedgerError::FutureCompletionDate`] and
    /// [`LedgerError::InvalidActivity`] from field validation.
    pub fn record_activity(
        &self,
        licensee_id: LicenseeId,
        activity: NewActivity,
    ) -> Result<CmeActivity, LedgerError> {
        activity.validate(self.clock.today())?;
        let activity = activity.into_activity(licensee_id, self.clock.now(), None, None);
        self.activities
            .write()
            .insert(activity.activity_id, activity.clone());
        tracing::debug!(
            activity_id = %activity.activity_id,
            %licensee_id,
            credit = %activity.credit_amount,
            "activity recorded"
        );
        Ok(activity)
    }

    /// An activity by identifier, superseded or not.
    pub fn activity(&self, activity_id: ActivityId) -> Result<CmeActivity, LedgerError> {
        self.activities
            .read()
            .get(&activity_id)
            .cloned()
            .ok_or(LedgerError::ActivityNotFound(activity_id))
    }

    /// Every activity a licensee has recorded, including superseded ones.
    pub fn activities_for_licensee(&self, licensee_id: LicenseeId) -> Vec<CmeActivity> {
        let mut list: Vec<_> = self
            .activities
            .read()
            .values()
            .filter(|a| a.licensee_id == licensee_id)
            .cloned()
            .collect();
        list.sort_by_key(|a| (a.completion_date, a.recorded_at));
        list
    }

    /// Replace an activity with a corrected record.
    ///
    /// The original is marked superseded and kept. Every active claim on
    /// the original is withdrawn and reopened on the new record with
    /// `carried_from` set.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::ActivityNotFound`]
    /// - [`LedgerError::ActivitySuperseded`] when the original was already
    ///   corrected; correct the newest record instead.
    /// - Field validation errors for the corrected values.
    pub fn correct_activity(
        &self,
        activity_id: ActivityId,
        correction: ActivityCorrection,
    ) -> Result<CmeActivity, LedgerError> {
        if correction.reason.trim().is_empty() {
            return Err(LedgerError::InvalidActivity(
                "a correction needs a reason".into(),
            ));
        }
        let now = self.clock.now();
        let today = self.clock.today();

        let (corrected, carried) = {
            let mut activities = self.activities.write();
            let original = activities
                .get(&activity_id)
                .ok_or(LedgerError::ActivityNotFound(activity_id))?;
            if let Some(superseded_by) = original.superseded_by {
                return Err(LedgerError::ActivitySuperseded {
                    activity: activity_id,
                    superseded_by,
                });
            }
            let fields = correction.apply_to(original);
            fields.validate(today)?;
            let corrected = fields.into_activity(
                original.licensee_id,
                now,
                Some(activity_id),
                Some(correction.reason.trim().to_string()),
            );

            let mut claims = self.claims.write();
            let mut carried = Vec::new();
            for claim in claims
                .iter_mut()
                .filter(|c| c.activity_id == activity_id && c.is_active())
            {
                claim.withdrawn_at = Some(now);
                carried.push(Claim {
                    carried_from: Some(claim.claim_id),
                    ..Claim::new(corrected.activity_id, claim.license_id, now)
                });
            }
            claims.extend(carried.iter().cloned());

            if let Some(original) = activities.get_mut(&activity_id) {
                original.superseded_by = Some(corrected.activity_id);
            }
            activities.insert(corrected.activity_id, corrected.clone());
            (corrected, carried.len())
        };

        tracing::info!(
            original = %activity_id,
            corrected = %corrected.activity_id,
            claims_carried = carried,
            "activity corrected"
        );
        Ok(corrected)
    }

    // -- Claims -----------------------------------------------------------

    /// Claim an activity toward a license.
    ///
    /// `rules` is the license jurisdiction's current rule version; its
    /// accepted credit types gate the claim. Acceptance is re-checked at
    /// evaluation time against whichever version governs then.
    ///
    /// Claiming a pair that already has an active claim returns that claim.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::LicenseNotFound`], [`LedgerError::ActivityNotFound`]
    /// - [`LedgerError::ActivitySuperseded`]
    /// - [`LedgerError::LicenseeMismatch`]
    /// - [`LedgerError::JurisdictionMismatch`] when `rules` belong elsewhere
    /// - [`LedgerError::ActivityOutsideCycle`] when the activity predates
    ///   the license's issue date
    /// - [`LedgerError::UnacceptedCreditType`]
    pub fn claim_activity(
        &self,
        activity_id: ActivityId,
        license_id: LicenseId,
        rules: &RuleVersion,
    ) -> Result<Claim, LedgerError> {
        let licenses = self.licenses.read();
        let license = licenses
            .get(&license_id)
            .ok_or(LedgerError::LicenseNotFound(license_id))?;
        let activities = self.activities.read();
        let activity = activities
            .get(&activity_id)
            .ok_or(LedgerError::ActivityNotFound(activity_id))?;

        let rejection = check_claim(license, activity, rules);
        if let Err(ref err) = rejection {
            tracing::warn!(
                %activity_id,
                %license_id,
                kind = err.kind(),
                "claim rejected"
            );
        }
        rejection?;

        let mut claims = self.claims.write();
        if let Some(existing) = claims
            .iter()
            .find(|c| c.activity_id == activity_id && c.license_id == license_id && c.is_active())
        {
            return Ok(existing.clone());
        }
        let claim = Claim::new(activity_id, license_id, self.clock.now());
        claims.push(claim.clone());
        tracing::debug!(%activity_id, %license_id, claim_id = %claim.claim_id, "activity claimed");
        Ok(claim)
    }

    /// Withdraw the active claim joining an activity and license.
    pub fn unclaim_activity(
        &self,
        activity_id: ActivityId,
        license_id: LicenseId,
    ) -> Result<Claim, LedgerError> {
        let mut claims = self.claims.write();
        let claim = claims
            .iter_mut()
            .find(|c| c.activity_id == activity_id && c.license_id == license_id && c.is_active())
            .ok_or(LedgerError::ClaimNotFound {
                activity: activity_id,
                license: license_id,
            })?;
        claim.withdrawn_at = Some(self.clock.now());
        Ok(claim.clone())
    }

    /// All claims, active or withdrawn, on an activity.
    pub fn claims_for_activity(&self, activity_id: ActivityId) -> Vec<Claim> {
        self.claims
            .read()
            .iter()
            .filter(|c| c.activity_id == activity_id)
            .cloned()
            .collect()
    }

    /// All claims, active or withdrawn, toward a license.
    pub fn claims_for_license(&self, license_id: LicenseId) -> Vec<Claim> {
        self.claims
            .read()
            .iter()
            .filter(|c| c.license_id == license_id)
            .cloned()
            .collect()
    }

    /// Activities actively claimed toward a license, excluding superseded
    /// records, ordered by completion date.
    pub fn claimed_activities(&self, license_id: LicenseId) -> Result<Vec<CmeActivity>, LedgerError> {
        if !self.licenses.read().contains_key(&license_id) {
            return Err(LedgerError::LicenseNotFound(license_id));
        }
        let activities = self.activities.read();
        let claims = self.claims.read();
        let mut list: Vec<CmeActivity> = claims
            .iter()
            .filter(|c| c.license_id == license_id && c.is_active())
            .filter_map(|c| activities.get(&c.activity_id))
            .filter(|a| !a.is_superseded())
            .cloned()
            .collect();
        list.sort_by_key(|a| (a.completion_date, a.activity_id));
        list.dedup_by_key(|a| a.activity_id);
        Ok(list)
    }

    // -- Hydration --------------------------------------------------------

    /// Re-insert a persisted license without validation or logging.
    pub fn restore_license(&self, license: License) {
        self.licenses.write().insert(license.license_id, license);
    }

    /// Re-insert a persisted activity.
    pub fn restore_activity(&self, activity: CmeActivity) {
        self.activities.write().insert(activity.activity_id, activity);
    }

    /// Re-insert a persisted claim, replacing any claim with the same id.
    pub fn restore_claim(&self, claim: Claim) {
        let mut claims = self.claims.write();
        match claims.iter_mut().find(|c| c.claim_id == claim.claim_id) {
            Some(existing) => *existing = claim,
            None => claims.push(claim),
        }
    }
}

fn check_claim(
    license: &License,
    activity: &CmeActivity,
    rules: &RuleVersion,
) -> Result<(), LedgerError> {
    if let Some(superseded_by) = activity.superseded_by {
        return Err(LedgerError::ActivitySuperseded {
            activity: activity.activity_id,
            superseded_by,
        });
    }
    if activity.licensee_id != license.licensee_id {
        return Err(LedgerError::LicenseeMismatch {
            activity: activity.activity_id,
            license: license.license_id,
        });
    }
    if rules.jurisdiction_id != license.jurisdiction_id {
        return Err(LedgerError::JurisdictionMismatch {
            rules: rules.jurisdiction_id.clone(),
            license: license.jurisdiction_id.clone(),
        });
    }
    if activity.completion_date < license.issue_date {
        return Err(LedgerError::ActivityOutsideCycle {
            completion_date: activity.completion_date,
            issue_date: license.issue_date,
        });
    }
    if !rules.rules.accepts(&activity.credit_type) {
        return Err(LedgerError::UnacceptedCreditType {
            credit_type: activity.credit_type.clone(),
            jurisdiction: license.jurisdiction_id.clone(),
            rule_version: rules.version_id.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use credmate_core::{CreditHours, CreditType, FixedClock, LicenseNumber, Timestamp, Topic, Weight};
    use credmate_rules::{
        CreditTypeAcceptance, GracePolicy, ProrationRule, RuleSet, RuleVersionId,
    };

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn tx() -> JurisdictionId {
        JurisdictionId::new("US-TX").unwrap()
    }

    fn rules_for(jurisdiction: JurisdictionId) -> RuleVersion {
        RuleVersion::new(
            RuleVersionId {
                jurisdiction,
                sequence: 1,
            },
            date(2020, 1, 1),
            RuleSet {
                cycle_length_months: 24,
                total_hours: CreditHours::from_whole(40),
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
            },
            Timestamp::start_of(date(2020, 1, 1)),
        )
        .unwrap()
    }

    struct Fixture {
        ledger: CredentialLedger,
        clock: Arc<FixedClock>,
        licensee: LicenseeId,
        license: License,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(FixedClock::at_date(date(2025, 6, 1)));
        let ledger = CredentialLedger::with_clock(clock.clone());
        let licensee = LicenseeId::new();
        let license = ledger
            .register_license(NewLicense {
                licensee_id: licensee,
                jurisdiction_id: tx(),
                license_number: LicenseNumber::new("Q1234").unwrap(),
                issue_date: date(2024, 1, 1),
                cycle_start: None,
                status: None,
            })
            .unwrap();
        Fixture {
            ledger,
            clock,
            licensee,
            license,
        }
    }

    fn activity(credit_type: &str, completed: NaiveDate) -> NewActivity {
        NewActivity {
            title: "Grand Rounds".into(),
            completion_date: completed,
            credit_amount: CreditHours::from_whole(3),
            credit_type: CreditType::new(credit_type).unwrap(),
            topics: vec![Topic::new("ethics").unwrap()],
            provider_id: None,
            certificate_ref: None,
        }
    }

    #[test]
    fn duplicate_license_number_rejected() {
        let f = fixture();
        let err = f
            .ledger
            .register_license(NewLicense {
                licensee_id: LicenseeId::new(),
                jurisdiction_id: tx(),
                license_number: LicenseNumber::new("Q1234").unwrap(),
                issue_date: date(2024, 1, 1),
                cycle_start: None,
                status: None,
            })
            .unwrap_err();
        assert_eq!(err.kind(), "DUPLICATE_LICENSE");
    }

    #[test]
    fn record_and_claim() {
        let f = fixture();
        let a = f
            .ledger
            .record_activity(f.licensee, activity("AMA_PRA_1", date(2025, 2, 1)))
            .unwrap();
        let claim = f
            .ledger
            .claim_activity(a.activity_id, f.license.license_id, &rules_for(tx()))
            .unwrap();
        assert!(claim.is_active());
        let claimed = f.ledger.claimed_activities(f.license.license_id).unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].activity_id, a.activity_id);
    }

    #[test]
    fn claim_is_idempotent() {
        let f = fixture();
        let a = f
            .ledger
            .record_activity(f.licensee, activity("AMA_PRA_1", date(2025, 2, 1)))
            .unwrap();
        let rules = rules_for(tx());
        let first = f
            .ledger
            .claim_activity(a.activity_id, f.license.license_id, &rules)
            .unwrap();
        let second = f
            .ledger
            .claim_activity(a.activity_id, f.license.license_id, &rules)
            .unwrap();
        assert_eq!(first.claim_id, second.claim_id);
        assert_eq!(f.ledger.claims_for_activity(a.activity_id).len(), 1);
    }

    #[test]
    fn unaccepted_credit_type_rejected() {
        let f = fixture();
        let a = f
            .ledger
            .record_activity(f.licensee, activity("AOA_1A", date(2025, 2, 1)))
            .unwrap();
        let err = f
            .ledger
            .claim_activity(a.activity_id, f.license.license_id, &rules_for(tx()))
            .unwrap_err();
        assert!(matches!(err, LedgerError::UnacceptedCreditType { .. }));
        assert!(f.ledger.claims_for_license(f.license.license_id).is_empty());
    }

    #[test]
    fn claim_checks_licensee_jurisdiction_and_issue_date() {
        let f = fixture();
        let other = f
            .ledger
            .record_activity(LicenseeId::new(), activity("AMA_PRA_1", date(2025, 2, 1)))
            .unwrap();
        let err = f
            .ledger
            .claim_activity(other.activity_id, f.license.license_id, &rules_for(tx()))
            .unwrap_err();
        assert_eq!(err.kind(), "LICENSEE_MISMATCH");

        let early = f
            .ledger
            .record_activity(f.licensee, activity("AMA_PRA_1", date(2023, 6, 1)))
            .unwrap();
        let err = f
            .ledger
            .claim_activity(early.activity_id, f.license.license_id, &rules_for(tx()))
            .unwrap_err();
        assert_eq!(err.kind(), "ACTIVITY_OUTSIDE_CYCLE");

        let ok = f
            .ledger
            .record_activity(f.licensee, activity("AMA_PRA_1", date(2025, 2, 1)))
            .unwrap();
        let err = f
            .ledger
            .claim_activity(
                ok.activity_id,
                f.license.license_id,
                &rules_for(JurisdictionId::new("US-IN").unwrap()),
            )
            .unwrap_err();
        assert_eq!(err.kind(), "JURISDICTION_MISMATCH");
    }

    #[test]
    fn future_activity_rejected_until_completed() {
        let f = fixture();
        let err = f
            .ledger
            .record_activity(f.licensee, activity("AMA_PRA_1", date(2025, 6, 2)))
            .unwrap_err();
        assert_eq!(err.kind(), "FUTURE_COMPLETION_DATE");
        f.clock.advance_days(1);
        assert!(f
            .ledger
            .record_activity(f.licensee, activity("AMA_PRA_1", date(2025, 6, 2)))
            .is_ok());
    }

    #[test]
    fn unclaim_withdraws_once() {
        let f = fixture();
        let a = f
            .ledger
            .record_activity(f.licensee, activity("AMA_PRA_1", date(2025, 2, 1)))
            .unwrap();
        f.ledger
            .claim_activity(a.activity_id, f.license.license_id, &rules_for(tx()))
            .unwrap();
        let withdrawn = f
            .ledger
            .unclaim_activity(a.activity_id, f.license.license_id)
            .unwrap();
        assert!(withdrawn.withdrawn_at.is_some());
        assert!(f
            .ledger
            .claimed_activities(f.license.license_id)
            .unwrap()
            .is_empty());
        let err = f
            .ledger
            .unclaim_activity(a.activity_id, f.license.license_id)
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(f.ledger.claims_for_activity(a.activity_id).len(), 1);
    }

    #[test]
    fn correction_supersedes_and_carries_claims() {
        let f = fixture();
        let original = f
            .ledger
            .record_activity(f.licensee, activity("AMA_PRA_1", date(2025, 2, 1)))
            .unwrap();
        f.ledger
            .claim_activity(original.activity_id, f.license.license_id, &rules_for(tx()))
            .unwrap();

        let corrected = f
            .ledger
            .correct_activity(
                original.activity_id,
                ActivityCorrection {
                    reason: "certificate shows 1.5 hours".into(),
                    credit_amount: Some(CreditHours::from_hundredths(150)),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(corrected.supersedes, Some(original.activity_id));
        let stored_original = f.ledger.activity(original.activity_id).unwrap();
        assert_eq!(stored_original.superseded_by, Some(corrected.activity_id));
        assert_eq!(stored_original.credit_amount, CreditHours::from_whole(3));

        let claimed = f.ledger.claimed_activities(f.license.license_id).unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].activity_id, corrected.activity_id);
        assert_eq!(claimed[0].credit_amount, CreditHours::from_hundredths(150));

        let carried = f.ledger.claims_for_activity(corrected.activity_id);
        assert_eq!(carried.len(), 1);
        assert!(carried[0].carried_from.is_some());

        let err = f
            .ledger
            .correct_activity(
                original.activity_id,
                ActivityCorrection {
                    reason: "again".into(),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert_eq!(err.kind(), "ACTIVITY_SUPERSEDED");
    }

    #[test]
    fn superseded_activity_cannot_be_claimed() {
        let f = fixture();
        let original = f
            .ledger
            .record_activity(f.licensee, activity("AMA_PRA_1", date(2025, 2, 1)))
            .unwrap();
        f.ledger
            .correct_activity(
                original.activity_id,
                ActivityCorrection {
                    reason: "typo in title".into(),
                    title: Some("Grand Rounds: Sepsis".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        let err = f
            .ledger
            .claim_activity(original.activity_id, f.license.license_id, &rules_for(tx()))
            .unwrap_err();
        assert_eq!(err.kind(), "ACTIVITY_SUPERSEDED");
    }

    #[test]
    fn correction_requires_reason() {
        let f = fixture();
        let a = f
            .ledger
            .record_activity(f.licensee, activity("AMA_PRA_1", date(2025, 2, 1)))
            .unwrap();
        assert!(f
            .ledger
            .correct_activity(a.activity_id, ActivityCorrection::default())
            .is_err());
    }

    #[test]
    fn renewal_and_status_flow_through_ledger() {
        let f = fixture();
        let id = f.license.license_id;
        f.ledger
            .transition_status(id, LicenseStatus::Lapsed, "not renewed")
            .unwrap();
        let renewed = f.ledger.record_renewal(id, date(2026, 1, 1)).unwrap();
        assert_eq!(renewed.status, LicenseStatus::Active);
        assert_eq!(f.ledger.license(id).unwrap().cycle_start, date(2026, 1, 1));
        let err = f
            .ledger
            .transition_status(id, LicenseStatus::Active, "noop")
            .unwrap_err();
        assert_eq!(err.kind(), "INVALID_STATUS_TRANSITION");
    }

    #[test]
    fn board_audit_lifecycle() {
        let f = fixture();
        let id = f.license.license_id;
        let audit = f
            .ledger
            .record_board_audit(id, date(2025, 5, 1), date(2025, 7, 1))
            .unwrap();
        assert_eq!(f.ledger.license(id).unwrap().open_audit_due(), Some(date(2025, 7, 1)));
        let answered = f
            .ledger
            .record_audit_response(id, audit.audit_id, date(2025, 6, 1))
            .unwrap();
        assert_eq!(answered.responded_on, Some(date(2025, 6, 1)));
        assert_eq!(f.ledger.license(id).unwrap().open_audit_due(), None);
        assert_eq!(
            f.ledger
                .record_audit_response(id, audit.audit_id, date(2025, 6, 2))
                .unwrap_err()
                .kind(),
            "AUDIT_ALREADY_RESPONDED"
        );
    }

    #[test]
    fn observations_never_change_status() {
        let f = fixture();
        let id = f.license.license_id;
        f.ledger
            .record_status_observation(StatusObservation {
                license_id: id,
                reported_status: LicenseStatus::Suspended,
                source: "board-feed".into(),
                observed_at: f.clock.now(),
                detail: None,
            })
            .unwrap();
        assert_eq!(f.ledger.license(id).unwrap().status, LicenseStatus::Active);
        assert_eq!(
            f.ledger.latest_observation(id).unwrap().reported_status,
            LicenseStatus::Suspended
        );
    }

    #[test]
    fn queries_by_owner_and_jurisdiction() {
        let f = fixture();
        assert_eq!(f.ledger.licenses_for_licensee(f.licensee).len(), 1);
        assert_eq!(f.ledger.licenses_in_jurisdiction(&tx()).len(), 1);
        assert!(f
            .ledger
            .licenses_in_jurisdiction(&JurisdictionId::new("US-IN").unwrap())
            .is_empty());
    }

    #[test]
    fn concurrent_claims_create_one_active_claim() {
        let f = fixture();
        let a = f
            .ledger
            .record_activity(f.licensee, activity("AMA_PRA_1", date(2025, 2, 1)))
            .unwrap();
        let ledger = Arc::new(f.ledger);
        let rules = Arc::new(rules_for(tx()));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                let rules = Arc::clone(&rules);
                let license_id = f.license.license_id;
                std::thread::spawn(move || {
                    ledger
                        .claim_activity(a.activity_id, license_id, &rules)
                        .unwrap()
                        .claim_id
                })
            })
            .collect();
        let ids: std::collections::BTreeSet<_> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(ids.len(), 1);
    }
}

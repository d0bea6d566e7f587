//! Cycle window and first-cycle proration.
//!
//! A cycle runs `[cycle_start, cycle_start + L months)`, where
//! `cycle_start` is the start of the cycle containing the evaluation date:
//! a date before a recorded renewal falls in the cycle that renewal closed.
//! When that cycle is the license's first and the rule version pins a
//! nominal cycle grid
//! (`nominal_cycle_anchor`), a cycle start that falls between grid
//! boundaries produces a short window ending at the next boundary, and the
//! total threshold is prorated by the months that remain:
//!
//! ```text
//! anchor ─────────── boundary ────────────── boundary ───────────
//!                        │   cycle_start        │
//!                        │       ├──────────────┤  months_remaining
//!                        ├──────────────────────┤  cycle_length_months
//! ```

use chrono::{Datelike, Days, Months, NaiveDate};
use credmate_core::{add_months, months_until, CreditHours};
use credmate_ledger::License;
use credmate_rules::{GracePolicy, ProrationRule, RuleSet};

use crate::error::EvaluationError;
use crate::snapshot::CycleWindow;

fn shift_months(date: NaiveDate, months: i64) -> Option<NaiveDate> {
    let magnitude = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    if months >= 0 {
        date.checked_add_months(magnitude)
    } else {
        date.checked_sub_months(magnitude)
    }
}

/// The first nominal boundary on or after `date` for a grid anchored at
/// `anchor` with period `length` months.
pub fn next_nominal_boundary(
    anchor: NaiveDate,
    length: u32,
    date: NaiveDate,
) -> Option<NaiveDate> {
    if length == 0 {
        return None;
    }
    let length = i64::from(length);
    let months_apart = i64::from(date.year() - anchor.year()) * 12
        + i64::from(date.month()) - i64::from(anchor.month());
    let mut k = months_apart.div_euclid(length) - 1;
    loop {
        let boundary = shift_months(anchor, k * length)?;
        if boundary >= date {
            return Some(boundary);
        }
        k += 1;
    }
}

/// First day after the grace window that follows `end`, or `None` when the
/// policy grants no grace.
pub fn grace_end(end: NaiveDate, policy: &GracePolicy) -> Option<NaiveDate> {
    match policy.days() {
        0 => None,
        days => Some(
            end.checked_add_days(Days::new(u64::from(days)))
                .unwrap_or(NaiveDate::MAX),
        ),
    }
}

/// Compute the window of the cycle containing `as_of` and its (possibly
/// prorated) total threshold.
pub fn cycle_window(
    license: &License,
    rules: &RuleSet,
    as_of: NaiveDate,
) -> Result<(CycleWindow, CreditHours), EvaluationError> {
    let length = rules.cycle_length_months;
    let start = license.cycle_start_on(as_of);
    let full_end = add_months(start, length)?;
    let first_cycle = license.is_first_cycle_on(as_of);

    let partial_end = match (first_cycle, rules.nominal_cycle_anchor) {
        (true, Some(anchor)) => next_nominal_boundary(anchor, length, start)
            .filter(|boundary| *boundary > start && *boundary < full_end),
        _ => None,
    };

    let (end, months_remaining) = match partial_end {
        Some(boundary) => (boundary, months_until(start, boundary).min(length)),
        None => (full_end, length),
    };

    let partial = months_remaining < length;
    let full = rules.total_hours;
    let required = if partial {
        match rules.proration {
            ProrationRule::None => full,
            ProrationRule::MonthsRemaining => full.prorate_ceil_whole(months_remaining, length),
            ProrationRule::ExemptFirstCycle => CreditHours::ZERO,
        }
    } else {
        full
    };

    let window = CycleWindow {
        start,
        end,
        first_cycle,
        cycle_length_months: length,
        months_remaining,
        prorated: required != full,
        full_required_hours: full,
    };
    Ok((window, required))
}

#[cfg(test)]
mod tests {
    use super::*;
    use credmate_core::{JurisdictionId, LicenseNumber, LicenseeId, Timestamp};
    use credmate_ledger::NewLicense;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn license(issue: NaiveDate) -> License {
        License::from_request(
            NewLicense {
                licensee_id: LicenseeId::new(),
                jurisdiction_id: JurisdictionId::new("US-TX").unwrap(),
                license_number: LicenseNumber::new("Q1").unwrap(),
                issue_date: issue,
                cycle_start: None,
                status: None,
            },
            Timestamp::start_of(issue),
        )
        .unwrap()
    }

    fn rules(anchor: Option<NaiveDate>, proration: ProrationRule) -> RuleSet {
        RuleSet {
            cycle_length_months: 24,
            total_hours: CreditHours::from_whole(40),
            topic_quotas: vec![],
            accepted_credit_types: vec![credmate_rules::CreditTypeAcceptance {
                credit_type: credmate_core::CreditType::new("AMA_PRA_1").unwrap(),
                weight: credmate_core::Weight::ONE,
            }],
            grace_policy: Default::default(),
            proration,
            nominal_cycle_anchor: anchor,
            compact: None,
            note: None,
            corrects: None,
        }
    }

    #[test]
    fn boundary_search_both_directions() {
        let anchor = date(2020, 1, 1);
        assert_eq!(next_nominal_boundary(anchor, 24, date(2024, 1, 1)), Some(date(2024, 1, 1)));
        assert_eq!(next_nominal_boundary(anchor, 24, date(2024, 1, 2)), Some(date(2026, 1, 1)));
        assert_eq!(next_nominal_boundary(anchor, 24, date(2015, 3, 1)), Some(date(2016, 1, 1)));
        assert_eq!(next_nominal_boundary(anchor, 12, date(2019, 12, 31)), Some(date(2020, 1, 1)));
    }

    #[test]
    fn no_anchor_means_full_window() {
        let (w, required) = cycle_window(
            &license(date(2024, 7, 15)),
            &rules(None, ProrationRule::MonthsRemaining),
            date(2024, 7, 15),
        )
        .unwrap();
        assert_eq!(w.end, date(2026, 7, 15));
        assert_eq!(required, CreditHours::from_whole(40));
        assert!(!w.prorated);
    }

    #[test]
    fn mid_grid_start_prorates_up() {
        // Seven months remain to the 2026-01-01 boundary (partial month rounds up).
        let (w, required) = cycle_window(
            &license(date(2025, 6, 15)),
            &rules(Some(date(2020, 1, 1)), ProrationRule::MonthsRemaining),
            date(2025, 6, 15),
        )
        .unwrap();
        assert_eq!(w.end, date(2026, 1, 1));
        assert_eq!(w.months_remaining, 7);
        // ceil(40 * 7 / 24) = ceil(11.67) = 12
        assert_eq!(required, CreditHours::from_whole(12));
        assert!(w.prorated);
    }

    #[test]
    fn start_on_boundary_is_full_threshold() {
        let (w, required) = cycle_window(
            &license(date(2024, 1, 1)),
            &rules(Some(date(2020, 1, 1)), ProrationRule::MonthsRemaining),
            date(2024, 1, 1),
        )
        .unwrap();
        assert_eq!(w.end, date(2026, 1, 1));
        assert_eq!(required, CreditHours::from_whole(40));
    }

    #[test]
    fn exempt_and_none_rules() {
        let l = license(date(2025, 6, 15));
        let anchor = Some(date(2020, 1, 1));
        let as_of = date(2025, 9, 1);
        let (_, exempt) =
            cycle_window(&l, &rules(anchor, ProrationRule::ExemptFirstCycle), as_of).unwrap();
        assert_eq!(exempt, CreditHours::ZERO);
        let (w, none) = cycle_window(&l, &rules(anchor, ProrationRule::None), as_of).unwrap();
        assert_eq!(none, CreditHours::from_whole(40));
        assert_eq!(w.end, date(2026, 1, 1));
    }

    #[test]
    fn renewed_license_ignores_anchor() {
        let mut l = license(date(2022, 6, 15));
        l.renew(date(2025, 6, 15), Timestamp::now()).unwrap();
        let (w, required) = cycle_window(
            &l,
            &rules(Some(date(2020, 1, 1)), ProrationRule::MonthsRemaining),
            date(2025, 7, 1),
        )
        .unwrap();
        assert!(!w.first_cycle);
        assert_eq!(w.end, date(2027, 6, 15));
        assert_eq!(required, CreditHours::from_whole(40));
    }

    #[test]
    fn date_before_renewal_uses_the_cycle_it_falls_in() {
        let mut l = license(date(2025, 6, 15));
        l.renew(date(2027, 6, 15), Timestamp::now()).unwrap();
        let r = rules(Some(date(2020, 1, 1)), ProrationRule::MonthsRemaining);

        let (before, required) = cycle_window(&l, &r, date(2025, 12, 15)).unwrap();
        assert_eq!(before.start, date(2025, 6, 15));
        assert_eq!(before.end, date(2026, 1, 1));
        assert!(before.first_cycle);
        assert_eq!(required, CreditHours::from_whole(12));

        let (after, required) = cycle_window(&l, &r, date(2027, 7, 1)).unwrap();
        assert_eq!(after.start, date(2027, 6, 15));
        assert!(!after.first_cycle);
        assert_eq!(required, CreditHours::from_whole(40));
    }
}

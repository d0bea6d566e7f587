//! Advisory pace heuristic for open cycles.
//!
//! The heuristic extrapolates the licensee's observed completion rate over
//! the rest of the window. It never produces a compliance determination:
//! its only output is an `at_risk` status tagged with an advisory basis.

use chrono::NaiveDate;
use credmate_core::CreditHours;
use serde::{Deserialize, Serialize};

/// Tuning for the pace heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaceConfig {
    /// Days of the window that must elapse before the observed rate is
    /// trusted.
    pub min_observation_days: u32,
    /// Days before the window ends at which any remaining shortfall is
    /// flagged regardless of rate.
    pub lead_days: u32,
}

impl Default for PaceConfig {
    fn default() -> Self {
        Self {
            min_observation_days: 90,
            lead_days: 90,
        }
    }
}

/// Result of a pace check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaceAssessment {
    /// Hours expected by window end at the observed rate.
    pub projected: CreditHours,
    /// Days left in the window.
    pub remaining_days: i64,
    /// Whether the projection falls short.
    pub behind: bool,
}

impl PaceConfig {
    /// Whether a topic shortfall this close to the end should be flagged.
    pub fn within_lead(&self, as_of: NaiveDate, end: NaiveDate) -> bool {
        (end - as_of).num_days() <= i64::from(self.lead_days)
    }

    /// Assess the total-hours pace, or `None` when there is too little
    /// history and the window is not yet within the lead period.
    pub fn assess(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        as_of: NaiveDate,
        accumulated: CreditHours,
        required: CreditHours,
    ) -> Option<PaceAssessment> {
        let elapsed = (as_of - start).num_days().max(0);
        let remaining = (end - as_of).num_days().max(0);
        let observed = elapsed >= i64::from(self.min_observation_days);
        if !observed && remaining > i64::from(self.lead_days) {
            return None;
        }
        let projected = if elapsed == 0 {
            accumulated
        } else {
            let total_days = u128::try_from(elapsed + remaining).unwrap_or(0);
            let scaled = u128::from(accumulated.hundredths()) * total_days
                / u128::try_from(elapsed).unwrap_or(1);
            CreditHours::from_hundredths(u64::try_from(scaled).unwrap_or(u64::MAX))
        };
        Some(PaceAssessment {
            projected,
            remaining_days: remaining,
            behind: projected < required,
        })
    }
}

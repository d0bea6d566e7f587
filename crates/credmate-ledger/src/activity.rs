//! CME activity records.
//!
//! Activities are never edited. [`ActivityCorrection`] produces a new
//! record whose `supersedes` points back at the original, and the original
//! gains a `superseded_by` marker. That marker is the only field written
//! after creation, and only once.

use chrono::NaiveDate;
use credmate_core::{ActivityId, CreditHours, CreditType, LicenseeId, ProviderId, Timestamp, Topic};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Maximum length of an activity title.
pub const MAX_TITLE_LEN: usize = 500;

/// Maximum length of a certificate reference.
pub const MAX_CERTIFICATE_REF_LEN: usize = 512;

/// A completed CME activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CmeActivity {
    /// Identifier.
    pub activity_id: ActivityId,
    /// Who completed it.
    pub licensee_id: LicenseeId,
    /// Course or activity title.
    pub title: String,
    /// Date the activity was completed.
    pub completion_date: NaiveDate,
    /// Credit amount printed on the certificate, before any weighting.
    pub credit_amount: CreditHours,
    /// Credit designation.
    pub credit_type: CreditType,
    /// Topic tags, normalized, sorted and deduplicated.
    #[serde(default)]
    pub topics: Vec<Topic>,
    /// Accredited provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<ProviderId>,
    /// Opaque pointer to the certificate document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_ref: Option<String>,
    /// When the record was created.
    pub recorded_at: Timestamp,
    /// The record this one corrects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supersedes: Option<ActivityId>,
    /// The record that corrects this one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<ActivityId>,
    /// Why this record was created as a correction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correction_reason: Option<String>,
}

impl CmeActivity {
    /// Whether a later correction replaced this record.
    pub fn is_superseded(&self) -> bool {
        self.superseded_by.is_some()
    }

    /// Whether the activity carries `topic`.
    pub fn has_topic(&self, topic: &Topic) -> bool {
        self.topics.contains(topic)
    }
}

/// Fields supplied when recording an activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewActivity {
    /// Course or activity title.
    pub title: String,
    /// Date the activity was completed.
    pub completion_date: NaiveDate,
    /// Credit amount on the certificate.
    pub credit_amount: CreditHours,
    /// Credit designation.
    pub credit_type: CreditType,
    /// Topic tags.
    #[serde(default)]
    pub topics: Vec<Topic>,
    /// Accredited provider.
    #[serde(default)]
    pub provider_id: Option<ProviderId>,
    /// Opaque certificate reference.
    #[serde(default)]
    pub certificate_ref: Option<String>,
}

impl NewActivity {
    /// Check the fields that do not depend on ledger state.
    pub fn validate(&self, today: NaiveDate) -> Result<(), LedgerError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(LedgerError::InvalidActivity("title must not be empty".into()));
        }
        if title.len() > MAX_TITLE_LEN {
            return Err(LedgerError::InvalidActivity(format!(
                "title must not exceed {MAX_TITLE_LEN} characters"
            )));
        }
        if self.credit_amount.is_zero() {
            return Err(LedgerError::InvalidActivity(
                "credit amount must be greater than zero".into(),
            ));
        }
        if self.completion_date > today {
            return Err(LedgerError::FutureCompletionDate {
                completion_date: self.completion_date,
                today,
            });
        }
        if let Some(ref cert) = self.certificate_ref {
            if cert.len() > MAX_CERTIFICATE_REF_LEN {
                return Err(LedgerError::InvalidActivity(format!(
                    "certificate reference must not exceed {MAX_CERTIFICATE_REF_LEN} characters"
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn into_activity(
        self,
        licensee_id: LicenseeId,
        recorded_at: Timestamp,
        supersedes: Option<ActivityId>,
        correction_reason: Option<String>,
    ) -> CmeActivity {
        let mut topics = self.topics;
        topics.sort();
        topics.dedup();
        CmeActivity {
            activity_id: ActivityId::new(),
            licensee_id,
            title: self.title.trim().to_string(),
            completion_date: self.completion_date,
            credit_amount: self.credit_amount,
            credit_type: self.credit_type,
            topics,
            provider_id: self.provider_id,
            certificate_ref: self.certificate_ref,
            recorded_at,
            supersedes,
            superseded_by: None,
            correction_reason,
        }
    }
}

/// A correction to a recorded activity. Absent fields keep the original
/// value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityCorrection {
    /// Why the record is being corrected.
    pub reason: String,
    /// Replacement title.
    #[serde(default)]
    pub title: Option<String>,
    /// Replacement completion date.
    #[serde(default)]
    pub completion_date: Option<NaiveDate>,
    /// Replacement credit amount.
    #[serde(default)]
    pub credit_amount: Option<CreditHours>,
    /// Replacement credit type.
    #[serde(default)]
    pub credit_type: Option<CreditType>,
    /// Replacement topic list.
    #[serde(default)]
    pub topics: Option<Vec<Topic>>,
    /// Replacement provider.
    #[serde(default)]
    pub provider_id: Option<ProviderId>,
    /// Replacement certificate reference.
    #[serde(default)]
    pub certificate_ref: Option<String>,
}

impl ActivityCorrection {
    /// Overlay the correction on `original`, producing the new record's fields.
    pub fn apply_to(&self, original: &CmeActivity) -> NewActivity {
        NewActivity {
            title: self.title.clone().unwrap_or_else(|| original.title.clone()),
            completion_date: self.completion_date.unwrap_or(original.completion_date),
            credit_amount: self.credit_amount.unwrap_or(original.credit_amount),
            credit_type: self
                .credit_type
                .clone()
                .unwrap_or_else(|| original.credit_type.clone()),
            topics: self.topics.clone().unwrap_or_else(|| original.topics.clone()),
            provider_id: self.provider_id.clone().or_else(|| original.provider_id.clone()),
            certificate_ref: self
                .certificate_ref
                .clone()
                .or_else(|| original.certificate_ref.clone()),
        }
    }
}

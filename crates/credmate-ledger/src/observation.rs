//! Results reported by an external license-verification feed.
//!
//! Observations are advisory. The evaluator compares the latest one with
//! the license's own status and raises an advisory on disagreement; the
//! license status itself is only changed through an explicit transition.

use credmate_core::{LicenseId, Timestamp};
use serde::{Deserialize, Serialize};

use crate::license::LicenseStatus;

/// One status report about a license from an outside source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusObservation {
    /// The license observed.
    pub license_id: LicenseId,
    /// The status the source reported.
    pub reported_status: LicenseStatus,
    /// Name of the source, e.g. a board verification endpoint.
    pub source: String,
    /// When the observation was made.
    pub observed_at: Timestamp,
    /// Free-text detail from the source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl StatusObservation {
    /// Whether the report disagrees with `status`.
    pub fn disagrees_with(&self, status: LicenseStatus) -> bool {
        self.reported_status != status
    }
}

//! Claims join an activity to a license.
//!
//! The same activity may be claimed toward several licenses. A claim is
//! withdrawn by stamping `withdrawn_at`, never by deletion; a correction
//! opens a fresh claim on the new record with `carried_from` pointing at
//! the claim it replaces.

use credmate_core::{ActivityId, ClaimId, LicenseId, Timestamp};
use serde::{Deserialize, Serialize};

/// An assertion that an activity counts toward a license.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    /// Identifier.
    pub claim_id: ClaimId,
    /// The claimed activity.
    pub activity_id: ActivityId,
    /// The license it counts toward.
    pub license_id: LicenseId,
    /// When the claim was made.
    pub claimed_at: Timestamp,
    /// When the claim was withdrawn, if it was.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub withdrawn_at: Option<Timestamp>,
    /// The claim on a superseded record that this one replaces.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carried_from: Option<ClaimId>,
}

impl Claim {
    /// A fresh, active claim.
    pub fn new(activity_id: ActivityId, license_id: LicenseId, claimed_at: Timestamp) -> Self {
        Self {
            claim_id: ClaimId::new(),
            activity_id,
            license_id,
            claimed_at,
            withdrawn_at: None,
            carried_from: None,
        }
    }

    /// Whether the claim is still in force.
    pub fn is_active(&self) -> bool {
        self.withdrawn_at.is_none()
    }
}

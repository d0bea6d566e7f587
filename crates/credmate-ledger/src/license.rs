//! # License Lifecycle
//!
//! A license is held by one licensee in one jurisdiction. Its status moves
//! through a small lifecycle; every change is appended to
//! `status_history` with a reason, and every renewal to `renewals`.
//!
//! ```text
//!            ┌──────────► Inactive ──┐
//!            │                       │
//!  Active ◄──┼──────────► Suspended ─┤
//!     │      │                       ├──► Revoked (terminal)
//!     │      ├──► Expired ──► Active │
//!     │      └──► Lapsed  ──► Active │
//!     └──────────────────────────────┘
//! ```

use chrono::NaiveDate;
use credmate_core::{AuditRequestId, JurisdictionId, LicenseId, LicenseNumber, LicenseeId, Timestamp};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// The lifecycle status of a license as reported by the licensee or board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LicenseStatus {
    /// In good standing; practice permitted.
    Active,
    /// Past its expiration date without renewal.
    Expired,
    /// Not renewed and administratively lapsed.
    Lapsed,
    /// Voluntarily inactive; practice not permitted.
    Inactive,
    /// Suspended by the board.
    Suspended,
    /// Revoked by the board. Terminal.
    Revoked,
}

impl LicenseStatus {
    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Lapsed => "lapsed",
            Self::Inactive => "inactive",
            Self::Suspended => "suspended",
            Self::Revoked => "revoked",
        }
    }

    /// Whether no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Revoked)
    }

    /// Whether the status itself permits practice.
    pub fn permits_practice(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Whether `to` is a legal next status.
    pub fn can_transition_to(&self, to: LicenseStatus) -> bool {
        use LicenseStatus::*;
        matches!(
            (self, to),
            (Active, Inactive | Suspended | Expired | Lapsed | Revoked)
                | (Inactive | Suspended | Expired | Lapsed, Active | Revoked)
        )
    }
}

impl std::fmt::Display for LicenseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry in a license's status history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTransition {
    /// Previous status.
    pub from: LicenseStatus,
    /// New status.
    pub to: LicenseStatus,
    /// Why the status changed.
    pub reason: String,
    /// When the change was recorded.
    pub at: Timestamp,
}

/// One recorded renewal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Renewal {
    /// Cycle start before the renewal.
    pub previous_cycle_start: NaiveDate,
    /// Cycle start after the renewal.
    pub new_cycle_start: NaiveDate,
    /// When the renewal was recorded.
    pub recorded_at: Timestamp,
}

/// A board-initiated CME audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardAudit {
    /// Identifier of the audit request.
    pub audit_id: AuditRequestId,
    /// When the board requested documentation.
    pub requested_on: NaiveDate,
    /// Response deadline.
    pub response_due: NaiveDate,
    /// When the licensee responded, once recorded.
    pub responded_on: Option<NaiveDate>,
    /// When the audit was recorded.
    pub recorded_at: Timestamp,
}

impl BoardAudit {
    /// Whether the audit still awaits a response.
    pub fn is_open(&self) -> bool {
        self.responded_on.is_none()
    }
}

/// Request to register a license.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLicense {
    /// The holder.
    pub licensee_id: LicenseeId,
    /// Issuing jurisdiction.
    pub jurisdiction_id: JurisdictionId,
    /// Board-issued number.
    pub license_number: LicenseNumber,
    /// Original issue date.
    pub issue_date: NaiveDate,
    /// Start of the current cycle. Defaults to the issue date.
    #[serde(default)]
    pub cycle_start: Option<NaiveDate>,
    /// Initial status. Defaults to active.
    #[serde(default)]
    pub status: Option<LicenseStatus>,
}

/// A license and its full lifecycle record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct License {
    /// Identifier.
    pub license_id: LicenseId,
    /// The holder.
    pub licensee_id: LicenseeId,
    /// Issuing jurisdiction.
    pub jurisdiction_id: JurisdictionId,
    /// Board-issued number.
    pub license_number: LicenseNumber,
    /// Original issue date.
    pub issue_date: NaiveDate,
    /// Start of the current cycle.
    pub cycle_start: NaiveDate,
    /// Current status.
    pub status: LicenseStatus,
    /// Renewal history, oldest first.
    #[serde(default)]
    pub renewals: Vec<Renewal>,
    /// Status history, oldest first.
    #[serde(default)]
    pub status_history: Vec<StatusTransition>,
    /// Board audits, oldest first.
    #[serde(default)]
    pub board_audits: Vec<BoardAudit>,
    /// When the license was registered with the engine.
    pub registered_at: Timestamp,
}

impl License {
    /// Build a license from a registration request.
    pub fn from_request(request: NewLicense, registered_at: Timestamp) -> Result<Self, LedgerError> {
        let cycle_start = request.cycle_start.unwrap_or(request.issue_date);
        if cycle_start < request.issue_date {
            return Err(LedgerError::InvalidLicense(format!(
                "cycle start {cycle_start} precedes issue date {}",
                request.issue_date
            )));
        }
        Ok(Self {
            license_id: LicenseId::new(),
            licensee_id: request.licensee_id,
            jurisdiction_id: request.jurisdiction_id,
            license_number: request.license_number,
            issue_date: request.issue_date,
            cycle_start,
            status: request.status.unwrap_or(LicenseStatus::Active),
            renewals: Vec::new(),
            status_history: Vec::new(),
            board_audits: Vec::new(),
            registered_at,
        })
    }

    /// Whether the current cycle is the license's first: no renewal has been
    /// recorded and the cycle began on the issue date.
    pub fn is_first_cycle(&self) -> bool {
        self.is_first_cycle_on(self.cycle_start)
    }

    /// Start of every known cycle, oldest first: the start in force before
    /// the first renewal, then each renewal's new start.
    pub fn cycle_starts(&self) -> Vec<NaiveDate> {
        let first = self
            .renewals
            .first()
            .map_or(self.cycle_start, |r| r.previous_cycle_start);
        std::iter::once(first)
            .chain(self.renewals.iter().map(|r| r.new_cycle_start))
            .collect()
    }

    /// Start of the cycle containing `as_of`. Dates before the earliest
    /// known cycle resolve to that cycle.
    pub fn cycle_start_on(&self, as_of: NaiveDate) -> NaiveDate {
        let starts = self.cycle_starts();
        starts
            .iter()
            .rev()
            .find(|start| **start <= as_of)
            .or_else(|| starts.first())
            .copied()
            .unwrap_or(self.cycle_start)
    }

    /// Whether the cycle containing `as_of` is the license's first: the
    /// earliest known cycle, begun on the issue date.
    pub fn is_first_cycle_on(&self, as_of: NaiveDate) -> bool {
        let start = self.cycle_start_on(as_of);
        self.cycle_starts().first() == Some(&start) && start == self.issue_date
    }

    /// The earliest response deadline among open board audits.
    pub fn open_audit_due(&self) -> Option<NaiveDate> {
        self.board_audits
            .iter()
            .filter(|a| a.is_open())
            .map(|a| a.response_due)
            .min()
    }

    /// Apply a status change, appending to the history.
    pub fn transition(
        &mut self,
        to: LicenseStatus,
        reason: impl Into<String>,
        at: Timestamp,
    ) -> Result<(), LedgerError> {
        if self.status.is_terminal() {
            return Err(LedgerError::LicenseRevoked(self.license_id));
        }
        if !self.status.can_transition_to(to) {
            return Err(LedgerError::InvalidStatusTransition {
                from: self.status,
                to,
            });
        }
        self.status_history.push(StatusTransition {
            from: self.status,
            to,
            reason: reason.into(),
            at,
        });
        self.status = to;
        Ok(())
    }

    /// Start a new cycle. Expired or lapsed licenses are reinstated.
    pub fn renew(&mut self, new_cycle_start: NaiveDate, at: Timestamp) -> Result<(), LedgerError> {
        if self.status.is_terminal() {
            return Err(LedgerError::LicenseRevoked(self.license_id));
        }
        if new_cycle_start <= self.cycle_start {
            return Err(LedgerError::RenewalNotAdvancing {
                current: self.cycle_start,
                requested: new_cycle_start,
            });
        }
        if matches!(self.status, LicenseStatus::Expired | LicenseStatus::Lapsed) {
            self.transition(LicenseStatus::Active, "reinstated by renewal", at)?;
        }
        self.renewals.push(Renewal {
            previous_cycle_start: self.cycle_start,
            new_cycle_start,
            recorded_at: at,
        });
        self.cycle_start = new_cycle_start;
        Ok(())
    }
}

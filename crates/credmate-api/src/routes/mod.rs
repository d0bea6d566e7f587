//! # Route Modules
//!
//! | Prefix                        | Module            |
//! |-------------------------------|-------------------|
//! | `/v1/jurisdictions`           | [`jurisdictions`] |
//! | `/v1/rules/{jurisdiction}/*`  | [`rules`]         |
//! | `/v1/licenses/*`              | [`licenses`]      |
//! | `/v1/licenses/{id}/compliance`, `evaluate`, `history`, `notifications` | [`compliance`] |
//! | `/v1/activities/*`            | [`activities`]    |
//!
//! Every write is applied to the in-memory engine first, then written
//! through to Postgres when a pool is configured. Writes that change what
//! a license's compliance depends on re-evaluate the affected licenses
//! before responding.

pub mod activities;
pub mod compliance;
pub mod jurisdictions;
pub mod licenses;
pub mod rules;

use chrono::NaiveDate;
use credmate_compliance::ComplianceSnapshot;
use credmate_core::LicenseId;
use credmate_ledger::License;
use serde::Deserialize;
use utoipa::IntoParams;

use crate::auth::{require_licensee_access, CallerIdentity};
use crate::db;
use crate::error::AppError;
use crate::state::AppState;

/// Optional evaluation or lookup date. Defaults to today.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct AsOfQuery {
    /// ISO date (`YYYY-MM-DD`).
    pub as_of: Option<NaiveDate>,
}

/// Fetch a license the caller is allowed to see.
pub(crate) fn visible_license(
    state: &AppState,
    caller: &CallerIdentity,
    license_id: LicenseId,
) -> Result<License, AppError> {
    let license = state.ledger().license(license_id)?;
    require_licensee_access(caller, license.licensee_id)?;
    Ok(license)
}

/// Re-evaluate after a license-level change. Evaluation failures leave the
/// write in place and are reported as a missing snapshot.
pub(crate) fn reevaluate_after_change(
    state: &AppState,
    license_id: LicenseId,
) -> Option<ComplianceSnapshot> {
    state
        .engine
        .on_license_changed(license_id)
        .map(|outcome| outcome.snapshot)
        .ok()
}

pub(crate) fn persist_failed(what: &'static str) -> impl FnOnce(sqlx::Error) -> AppError {
    move |e| {
        tracing::error!(error = %e, what, "write-through to database failed");
        AppError::Internal(format!(
            "{what} recorded in memory but database persist failed"
        ))
    }
}

/// Write the license's current document and any new snapshots.
pub(crate) async fn persist_license(state: &AppState, license_id: LicenseId) -> Result<(), AppError> {
    let Some(pool) = &state.db_pool else {
        return Ok(());
    };
    let license = state.ledger().license(license_id)?;
    db::ledger::upsert_license(pool, &license)
        .await
        .map_err(persist_failed("license"))?;
    persist_history(state, [license_id]).await
}

/// Write snapshots appended since the last flush for each license.
pub(crate) async fn persist_history(
    state: &AppState,
    licenses: impl IntoIterator<Item = LicenseId>,
) -> Result<(), AppError> {
    let Some(pool) = &state.db_pool else {
        return Ok(());
    };
    for license_id in licenses {
        db::history::flush(pool, state.engine.history(), license_id)
            .await
            .map_err(persist_failed("snapshot history"))?;
    }
    Ok(())
}

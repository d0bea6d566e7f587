//! # Compliance API
//!
//! Read and recompute a license's standing. Snapshots are never edited:
//! `GET .../compliance` returns the latest recorded one, `POST .../evaluate`
//! records a new one, and `GET .../history` returns the full hash-chained
//! series with its verification result.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use credmate_compliance::ComplianceSnapshot;
use credmate_core::LicenseId;
use credmate_monitor::{ChainVerification, HistoryEntry, Notification, ScheduledDeadline};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::routes::{persist_history, visible_license, AsOfQuery};
use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct EvaluationResponse {
    #[schema(value_type = Object)]
    pub snapshot: ComplianceSnapshot,
    /// False when the snapshot equals the latest recorded one.
    pub appended: bool,
    #[schema(value_type = Vec<Object>)]
    pub notifications: Vec<Notification>,
    /// Next scheduled evaluation. Absent for retrospective evaluations.
    #[schema(value_type = Option<Object>)]
    pub next: Option<ScheduledDeadline>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HistoryResponse {
    /// Entries in sequence order.
    #[schema(value_type = Vec<Object>)]
    pub entries: Vec<HistoryEntry>,
    #[schema(value_type = Object)]
    pub chain: ChainVerification,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/licenses/:id/compliance", get(get_compliance))
        .route("/v1/licenses/:id/evaluate", post(evaluate))
        .route("/v1/licenses/:id/history", get(get_history))
        .route("/v1/licenses/:id/notifications", get(get_notifications))
}

/// GET /v1/licenses/{id}/compliance: Latest snapshot.
///
/// Without `as_of` the latest recorded snapshot is returned, evaluating
/// today when none exists. With `as_of` the snapshot recorded on or before
/// that date is returned; when history holds none it is computed without
/// being recorded.
#[utoipa::path(
    get,
    path = "/v1/licenses/{id}/compliance",
    params(("id" = Uuid, Path, description = "License ID"), AsOfQuery),
    responses(
        (status = 200, description = "Compliance snapshot", body = serde_json::Value),
        (status = 404, description = "License not found", body = crate::error::ErrorBody),
        (status = 422, description = "License cannot be evaluated", body = crate::error::ErrorBody),
    ),
    tag = "compliance"
)]
async fn get_compliance(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    Query(query): Query<AsOfQuery>,
) -> Result<Json<ComplianceSnapshot>, AppError> {
    let license_id = LicenseId::from_uuid(id);
    visible_license(&state, &caller, license_id)?;

    let snapshot = match query.as_of {
        Some(as_of) => match state.engine.history().at_or_before(license_id, as_of) {
            Some(snapshot) => snapshot,
            None => state.engine.evaluate_at(license_id, as_of)?,
        },
        None => {
            let snapshot = state.engine.latest_or_evaluate(license_id)?;
            persist_history(&state, [license_id]).await?;
            snapshot
        }
    };
    Ok(Json(snapshot))
}

/// POST /v1/licenses/{id}/evaluate: Evaluate and record.
#[utoipa::path(
    post,
    path = "/v1/licenses/{id}/evaluate",
    params(("id" = Uuid, Path, description = "License ID"), AsOfQuery),
    responses(
        (status = 200, description = "Evaluation recorded", body = EvaluationResponse),
        (status = 404, description = "License not found", body = crate::error::ErrorBody),
        (status = 422, description = "License cannot be evaluated", body = crate::error::ErrorBody),
    ),
    tag = "compliance"
)]
async fn evaluate(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    Query(query): Query<AsOfQuery>,
) -> Result<Json<EvaluationResponse>, AppError> {
    let license_id = LicenseId::from_uuid(id);
    visible_license(&state, &caller, license_id)?;

    let as_of = query.as_of.unwrap_or_else(|| state.engine.today());
    let outcome = state.engine.evaluate_and_record(license_id, as_of)?;
    persist_history(&state, [license_id]).await?;

    Ok(Json(EvaluationResponse {
        snapshot: outcome.snapshot,
        appended: outcome.appended,
        notifications: outcome.notifications,
        next: outcome.next,
    }))
}

/// GET /v1/licenses/{id}/history: Snapshot time series.
#[utoipa::path(
    get,
    path = "/v1/licenses/{id}/history",
    params(("id" = Uuid, Path, description = "License ID")),
    responses(
        (status = 200, description = "Snapshot history and chain status", body = HistoryResponse),
        (status = 404, description = "License not found", body = crate::error::ErrorBody),
    ),
    tag = "compliance"
)]
async fn get_history(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<HistoryResponse>, AppError> {
    let license_id = LicenseId::from_uuid(id);
    visible_license(&state, &caller, license_id)?;

    let history = state.engine.history();
    Ok(Json(HistoryResponse {
        entries: history.history(license_id),
        chain: history.verify_chain(license_id),
    }))
}

/// GET /v1/licenses/{id}/notifications: Pending notifications.
#[utoipa::path(
    get,
    path = "/v1/licenses/{id}/notifications",
    params(("id" = Uuid, Path, description = "License ID")),
    responses(
        (status = 200, description = "Pending notifications, oldest first", body = serde_json::Value),
        (status = 404, description = "License not found", body = crate::error::ErrorBody),
    ),
    tag = "compliance"
)]
async fn get_notifications(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Notification>>, AppError> {
    let license_id = LicenseId::from_uuid(id);
    visible_license(&state, &caller, license_id)?;
    Ok(Json(state.engine.outbox().pending(license_id)))
}

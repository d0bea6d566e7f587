//! # License API
//!
//! License registration and lifecycle: renewals, status transitions,
//! board audits, and external verification observations. Each write
//! re-evaluates the license so the response reflects its new standing.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use credmate_compliance::ComplianceSnapshot;
use credmate_core::{AuditRequestId, JurisdictionId, LicenseId, LicenseNumber, LicenseeId};
use credmate_ledger::{BoardAudit, License, LicenseStatus, NewLicense, StatusObservation};
use credmate_rules::RuleStoreError;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::{require_licensee_access, require_role, CallerIdentity, Role};
use crate::db;
use crate::error::AppError;
use crate::extractors::{extract_validated_json, Validate};
use crate::routes::{persist_failed, persist_license, reevaluate_after_change, visible_license};
use crate::state::AppState;
use crate::verification::VerificationError;

// -- Request / response types -------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterLicenseRequest {
    pub licensee_id: Uuid,
    /// Issuing jurisdiction, e.g. `US-TX`.
    pub jurisdiction_id: String,
    pub license_number: String,
    pub issue_date: NaiveDate,
    /// Start of the current cycle. Defaults to the issue date.
    #[serde(default)]
    pub cycle_start: Option<NaiveDate>,
    /// Initial status. Defaults to `active`.
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub status: Option<LicenseStatus>,
}

impl Validate for RegisterLicenseRequest {
    fn validate(&self) -> Result<(), String> {
        if let Some(start) = self.cycle_start {
            if start < self.issue_date {
                return Err("cycle_start must not precede issue_date".into());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RenewalRequest {
    pub new_cycle_start: NaiveDate,
}

impl Validate for RenewalRequest {
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct StatusTransitionRequest {
    #[schema(value_type = String)]
    pub status: LicenseStatus,
    pub reason: String,
}

impl Validate for StatusTransitionRequest {
    fn validate(&self) -> Result<(), String> {
        if self.reason.trim().is_empty() {
            return Err("reason must not be empty".into());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BoardAuditRequest {
    pub requested_on: NaiveDate,
    pub response_due: NaiveDate,
}

impl Validate for BoardAuditRequest {
    fn validate(&self) -> Result<(), String> {
        if self.response_due < self.requested_on {
            return Err("response_due must not precede requested_on".into());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AuditResponseRequest {
    pub responded_on: NaiveDate,
}

impl Validate for AuditResponseRequest {
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Record an external status observation. When `reported_status` is
/// omitted the configured verification feed is queried instead.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct VerificationRequest {
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub reported_status: Option<LicenseStatus>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
}

impl Validate for VerificationRequest {
    fn validate(&self) -> Result<(), String> {
        if self.reported_status.is_some()
            && self.source.as_deref().map_or(true, |s| s.trim().is_empty())
        {
            return Err("a reported status needs a source".into());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct LicenseListQuery {
    /// Restrict to one licensee. Required for the licensee role.
    pub licensee_id: Option<Uuid>,
}

/// A license together with its standing after the change.
#[derive(Debug, Serialize, ToSchema)]
pub struct LicenseResponse {
    #[schema(value_type = Object)]
    pub license: License,
    /// `None` when the license could not be evaluated (for example, no
    /// rule version is effective yet).
    #[schema(value_type = Option<Object>)]
    pub compliance: Option<ComplianceSnapshot>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BoardAuditResponse {
    #[schema(value_type = Object)]
    pub audit: BoardAudit,
    #[schema(value_type = Option<Object>)]
    pub compliance: Option<ComplianceSnapshot>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ObservationResponse {
    #[schema(value_type = Object)]
    pub observation: StatusObservation,
    /// Whether the reported status differs from the license record.
    pub mismatch: bool,
    #[schema(value_type = Option<Object>)]
    pub compliance: Option<ComplianceSnapshot>,
}

// -- Router -------------------------------------------------------------------

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/licenses", get(list_licenses).post(register_license))
        .route("/v1/licenses/:id", get(get_license))
        .route("/v1/licenses/:id/renewals", post(record_renewal))
        .route("/v1/licenses/:id/status", post(transition_status))
        .route("/v1/licenses/:id/audits", post(record_board_audit))
        .route(
            "/v1/licenses/:id/audits/:audit_id/response",
            post(record_audit_response),
        )
        .route("/v1/licenses/:id/verification", post(record_verification))
}

// -- Handlers -----------------------------------------------------------------

/// POST /v1/licenses: Register a license.
#[utoipa::path(
    post,
    path = "/v1/licenses",
    request_body = RegisterLicenseRequest,
    responses(
        (status = 201, description = "License registered", body = LicenseResponse),
        (status = 404, description = "Unknown jurisdiction", body = crate::error::ErrorBody),
        (status = 409, description = "License number already registered", body = crate::error::ErrorBody),
    ),
    tag = "licenses"
)]
async fn register_license(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<RegisterLicenseRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<LicenseResponse>), AppError> {
    let req = extract_validated_json(body)?;
    let licensee_id = LicenseeId::from_uuid(req.licensee_id);
    require_licensee_access(&caller, licensee_id)?;

    let jurisdiction_id = JurisdictionId::new(req.jurisdiction_id)?;
    if state.rules().jurisdiction(&jurisdiction_id).is_none() {
        return Err(RuleStoreError::UnknownJurisdiction(jurisdiction_id).into());
    }

    let license = state.ledger().register_license(NewLicense {
        licensee_id,
        jurisdiction_id,
        license_number: LicenseNumber::new(req.license_number)?,
        issue_date: req.issue_date,
        cycle_start: req.cycle_start,
        status: req.status,
    })?;
    let compliance = reevaluate_after_change(&state, license.license_id);
    persist_license(&state, license.license_id).await?;

    Ok((
        StatusCode::CREATED,
        Json(LicenseResponse {
            license,
            compliance,
        }),
    ))
}

/// GET /v1/licenses: List licenses, optionally for one licensee.
#[utoipa::path(
    get,
    path = "/v1/licenses",
    params(LicenseListQuery),
    responses(
        (status = 200, description = "Licenses", body = serde_json::Value),
    ),
    tag = "licenses"
)]
async fn list_licenses(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Query(query): Query<LicenseListQuery>,
) -> Result<Json<Vec<License>>, AppError> {
    let licensee = query
        .licensee_id
        .map(LicenseeId::from_uuid)
        .or(caller.licensee_id.filter(|_| caller.role == Role::Licensee));
    match licensee {
        Some(licensee_id) => {
            require_licensee_access(&caller, licensee_id)?;
            Ok(Json(state.ledger().licenses_for_licensee(licensee_id)))
        }
        None => {
            require_role(&caller, Role::Reviewer)?;
            Ok(Json(state.ledger().licenses()))
        }
    }
}

/// GET /v1/licenses/{id}: Read a license.
#[utoipa::path(
    get,
    path = "/v1/licenses/{id}",
    params(("id" = Uuid, Path, description = "License ID")),
    responses(
        (status = 200, description = "License", body = serde_json::Value),
        (status = 404, description = "License not found", body = crate::error::ErrorBody),
    ),
    tag = "licenses"
)]
async fn get_license(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<License>, AppError> {
    Ok(Json(visible_license(&state, &caller, LicenseId::from_uuid(id))?))
}

/// POST /v1/licenses/{id}/renewals: Start a new cycle.
#[utoipa::path(
    post,
    path = "/v1/licenses/{id}/renewals",
    params(("id" = Uuid, Path, description = "License ID")),
    request_body = RenewalRequest,
    responses(
        (status = 200, description = "Renewal recorded", body = LicenseResponse),
        (status = 409, description = "Renewal does not advance the cycle or license revoked", body = crate::error::ErrorBody),
    ),
    tag = "licenses"
)]
async fn record_renewal(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<RenewalRequest>, JsonRejection>,
) -> Result<Json<LicenseResponse>, AppError> {
    let license_id = LicenseId::from_uuid(id);
    visible_license(&state, &caller, license_id)?;
    let req = extract_validated_json(body)?;

    let license = state
        .ledger()
        .record_renewal(license_id, req.new_cycle_start)?;
    let compliance = reevaluate_after_change(&state, license_id);
    persist_license(&state, license_id).await?;
    Ok(Json(LicenseResponse {
        license,
        compliance,
    }))
}

/// POST /v1/licenses/{id}/status: Record a status transition (reviewer).
#[utoipa::path(
    post,
    path = "/v1/licenses/{id}/status",
    params(("id" = Uuid, Path, description = "License ID")),
    request_body = StatusTransitionRequest,
    responses(
        (status = 200, description = "Status changed", body = LicenseResponse),
        (status = 403, description = "Reviewer role required", body = crate::error::ErrorBody),
        (status = 409, description = "Transition not allowed", body = crate::error::ErrorBody),
    ),
    tag = "licenses"
)]
async fn transition_status(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<StatusTransitionRequest>, JsonRejection>,
) -> Result<Json<LicenseResponse>, AppError> {
    require_role(&caller, Role::Reviewer)?;
    let license_id = LicenseId::from_uuid(id);
    let req = extract_validated_json(body)?;

    let license = state
        .ledger()
        .transition_status(license_id, req.status, req.reason)?;
    let compliance = reevaluate_after_change(&state, license_id);
    persist_license(&state, license_id).await?;
    Ok(Json(LicenseResponse {
        license,
        compliance,
    }))
}

/// POST /v1/licenses/{id}/audits: Record a board audit request (reviewer).
#[utoipa::path(
    post,
    path = "/v1/licenses/{id}/audits",
    params(("id" = Uuid, Path, description = "License ID")),
    request_body = BoardAuditRequest,
    responses(
        (status = 201, description = "Audit recorded", body = BoardAuditResponse),
        (status = 403, description = "Reviewer role required", body = crate::error::ErrorBody),
    ),
    tag = "licenses"
)]
async fn record_board_audit(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<BoardAuditRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<BoardAuditResponse>), AppError> {
    require_role(&caller, Role::Reviewer)?;
    let license_id = LicenseId::from_uuid(id);
    let req = extract_validated_json(body)?;

    let audit = state
        .ledger()
        .record_board_audit(license_id, req.requested_on, req.response_due)?;
    let compliance = reevaluate_after_change(&state, license_id);
    persist_license(&state, license_id).await?;
    Ok((
        StatusCode::CREATED,
        Json(BoardAuditResponse { audit, compliance }),
    ))
}

/// POST /v1/licenses/{id}/audits/{audit_id}/response: Record the
/// licensee's audit response.
#[utoipa::path(
    post,
    path = "/v1/licenses/{id}/audits/{audit_id}/response",
    params(
        ("id" = Uuid, Path, description = "License ID"),
        ("audit_id" = Uuid, Path, description = "Audit request ID"),
    ),
    request_body = AuditResponseRequest,
    responses(
        (status = 200, description = "Response recorded", body = BoardAuditResponse),
        (status = 404, description = "Audit not found", body = crate::error::ErrorBody),
        (status = 409, description = "Audit already answered", body = crate::error::ErrorBody),
    ),
    tag = "licenses"
)]
async fn record_audit_response(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path((id, audit_id)): Path<(Uuid, Uuid)>,
    body: Result<Json<AuditResponseRequest>, JsonRejection>,
) -> Result<Json<BoardAuditResponse>, AppError> {
    let license_id = LicenseId::from_uuid(id);
    visible_license(&state, &caller, license_id)?;
    let req = extract_validated_json(body)?;

    let audit = state.ledger().record_audit_response(
        license_id,
        AuditRequestId::from_uuid(audit_id),
        req.responded_on,
    )?;
    let compliance = reevaluate_after_change(&state, license_id);
    persist_license(&state, license_id).await?;
    Ok(Json(BoardAuditResponse { audit, compliance }))
}

/// POST /v1/licenses/{id}/verification: Record an external status
/// observation, either supplied by a reviewer or fetched from the feed.
#[utoipa::path(
    post,
    path = "/v1/licenses/{id}/verification",
    params(("id" = Uuid, Path, description = "License ID")),
    request_body = VerificationRequest,
    responses(
        (status = 201, description = "Observation recorded", body = ObservationResponse),
        (status = 404, description = "License not found, or unknown to the feed", body = crate::error::ErrorBody),
        (status = 503, description = "Verification feed unavailable or not configured", body = crate::error::ErrorBody),
    ),
    tag = "licenses"
)]
async fn record_verification(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<VerificationRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ObservationResponse>), AppError> {
    let license_id = LicenseId::from_uuid(id);
    let license = visible_license(&state, &caller, license_id)?;
    let req = extract_validated_json(body)?;

    let observation = match req.reported_status {
        Some(reported_status) => {
            require_role(&caller, Role::Reviewer)?;
            StatusObservation {
                license_id,
                reported_status,
                source: req.source.unwrap_or_default().trim().to_string(),
                observed_at: state.engine.now(),
                detail: req.detail,
            }
        }
        None => {
            let client = state.verification.as_ref().ok_or_else(|| {
                AppError::Unavailable("no verification feed is configured".into())
            })?;
            client
                .verify_license(&license, state.engine.now())
                .await
                .map_err(feed_error)?
        }
    };

    let mismatch = observation.disagrees_with(license.status);
    state
        .ledger()
        .record_status_observation(observation.clone())?;
    if let Some(pool) = &state.db_pool {
        db::ledger::insert_observation(pool, &observation)
            .await
            .map_err(persist_failed("status observation"))?;
    }
    let compliance = reevaluate_after_change(&state, license_id);
    crate::routes::persist_history(&state, [license_id]).await?;

    Ok((
        StatusCode::CREATED,
        Json(ObservationResponse {
            observation,
            mismatch,
            compliance,
        }),
    ))
}

fn feed_error(err: VerificationError) -> AppError {
    match err {
        VerificationError::NotListed { .. } => AppError::NotFound(err.to_string()),
        e if e.is_transient() => {
            tracing::warn!(error = %e, "verification feed unavailable");
            AppError::Unavailable(e.to_string())
        }
        e => AppError::Internal(e.to_string()),
    }
}

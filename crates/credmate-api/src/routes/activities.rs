//! # Activity API
//!
//! Records CME activities and the claims joining them to licenses. Claims
//! are gated by the credit types accepted under the rule version effective
//! today; every license whose claims change is re-evaluated before the
//! response is sent.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use credmate_compliance::ComplianceSnapshot;
use credmate_core::{
    ActivityId, CreditHours, CreditType, LicenseId, LicenseeId, ProviderId, Topic,
};
use credmate_ledger::{ActivityCorrection, Claim, CmeActivity, NewActivity};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{require_licensee_access, CallerIdentity};
use crate::db;
use crate::error::AppError;
use crate::extractors::{extract_validated_json, Validate};
use crate::routes::{persist_failed, persist_history, visible_license};
use crate::state::AppState;

// -- Request / response types -------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct RecordActivityRequest {
    pub licensee_id: Uuid,
    pub title: String,
    pub completion_date: NaiveDate,
    /// Credit amount, e.g. `"1.50"` or `1.5`.
    #[schema(value_type = String)]
    pub credit_amount: CreditHours,
    /// Credit designation, e.g. `AMA_PRA_CATEGORY_1`.
    pub credit_type: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub provider_id: Option<String>,
    #[serde(default)]
    pub certificate_ref: Option<String>,
    /// Licenses to claim the activity toward.
    #[serde(default)]
    pub claim_for: Vec<Uuid>,
}

impl Validate for RecordActivityRequest {
    fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("title must not be empty".into());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ClaimRequest {
    pub license_id: Uuid,
}

impl Validate for ClaimRequest {
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Fields to replace on a recorded activity. Absent fields keep their
/// current value.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CorrectionRequest {
    pub reason: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub completion_date: Option<NaiveDate>,
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub credit_amount: Option<CreditHours>,
    #[serde(default)]
    pub credit_type: Option<String>,
    #[serde(default)]
    pub topics: Option<Vec<String>>,
    #[serde(default)]
    pub provider_id: Option<String>,
    #[serde(default)]
    pub certificate_ref: Option<String>,
}

impl Validate for CorrectionRequest {
    fn validate(&self) -> Result<(), String> {
        if self.reason.trim().is_empty() {
            return Err("reason must not be empty".into());
        }
        Ok(())
    }
}

/// A claim that could not be made.
#[derive(Debug, Serialize, ToSchema)]
pub struct ClaimRejection {
    pub license_id: Uuid,
    /// Machine-readable kind, e.g. `UNACCEPTED_CREDIT_TYPE`.
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ActivityResponse {
    #[schema(value_type = Object)]
    pub activity: CmeActivity,
    #[schema(value_type = Vec<Object>)]
    pub claims: Vec<Claim>,
    /// Requested claims that were refused. The activity is recorded
    /// regardless.
    pub rejected: Vec<ClaimRejection>,
    /// Snapshots of the licenses re-evaluated by this write.
    #[schema(value_type = Vec<Object>)]
    pub compliance: Vec<ComplianceSnapshot>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ClaimResponse {
    #[schema(value_type = Object)]
    pub claim: Claim,
    #[schema(value_type = Vec<Object>)]
    pub compliance: Vec<ComplianceSnapshot>,
}

// -- Router -------------------------------------------------------------------

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/activities", post(record_activity))
        .route("/v1/activities/:id", get(get_activity))
        .route("/v1/activities/:id/claims", post(claim_activity))
        .route(
            "/v1/activities/:id/claims/:license_id",
            delete(unclaim_activity),
        )
        .route("/v1/activities/:id/corrections", post(correct_activity))
}

// -- Helpers ------------------------------------------------------------------

fn parse_topics(raw: Vec<String>) -> Result<Vec<Topic>, AppError> {
    raw.into_iter()
        .map(|t| Topic::new(t).map_err(AppError::from))
        .collect()
}

fn parse_provider(raw: Option<String>) -> Result<Option<ProviderId>, AppError> {
    raw.map(ProviderId::new).transpose().map_err(AppError::from)
}

/// Fetch an activity whose owner the caller may act for.
fn visible_activity(
    state: &AppState,
    caller: &CallerIdentity,
    activity_id: ActivityId,
) -> Result<CmeActivity, AppError> {
    let activity = state.ledger().activity(activity_id)?;
    require_licensee_access(caller, activity.licensee_id)?;
    Ok(activity)
}

/// Claim under the rule version the license's jurisdiction has in force
/// today.
fn claim_under_current_rules(
    state: &AppState,
    activity_id: ActivityId,
    license_id: LicenseId,
) -> Result<Claim, AppError> {
    let license = state.ledger().license(license_id)?;
    let rules = state
        .rules()
        .effective_rule_version(&license.jurisdiction_id, state.engine.today())?;
    Ok(state.ledger().claim_activity(activity_id, license_id, &rules)?)
}

/// Persist every claim on an activity, then re-evaluate the licenses
/// holding them and persist their new snapshots.
async fn settle_activity(
    state: &AppState,
    activity_id: ActivityId,
) -> Result<Vec<ComplianceSnapshot>, AppError> {
    let claims = persist_claims(state, activity_id).await?;
    let outcomes = state.engine.on_activity_changed(activity_id);
    persist_history(state, claims.iter().map(|c| c.license_id).collect::<Vec<_>>()).await?;
    Ok(outcomes.into_iter().map(|o| o.snapshot).collect())
}

async fn persist_claims(state: &AppState, activity_id: ActivityId) -> Result<Vec<Claim>, AppError> {
    let claims = state.ledger().claims_for_activity(activity_id);
    if let Some(pool) = &state.db_pool {
        for claim in &claims {
            db::ledger::upsert_claim(pool, claim)
                .await
                .map_err(persist_failed("claim"))?;
        }
    }
    Ok(claims)
}

async fn persist_activity(state: &AppState, activity: &CmeActivity) -> Result<(), AppError> {
    if let Some(pool) = &state.db_pool {
        db::ledger::upsert_activity(pool, activity)
            .await
            .map_err(persist_failed("activity"))?;
    }
    Ok(())
}

// -- Handlers -----------------------------------------------------------------

/// POST /v1/activities: Record an activity and claim it.
#[utoipa::path(
    post,
    path = "/v1/activities",
    request_body = RecordActivityRequest,
    responses(
        (status = 201, description = "Activity recorded; see `rejected` for refused claims", body = ActivityResponse),
        (status = 422, description = "Invalid activity", body = crate::error::ErrorBody),
    ),
    tag = "activities"
)]
async fn record_activity(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<RecordActivityRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ActivityResponse>), AppError> {
    let req = extract_validated_json(body)?;
    let licensee_id = LicenseeId::from_uuid(req.licensee_id);
    require_licensee_access(&caller, licensee_id)?;

    let targets: Vec<LicenseId> = req
        .claim_for
        .iter()
        .copied()
        .map(LicenseId::from_uuid)
        .collect();
    for license_id in &targets {
        visible_license(&state, &caller, *license_id)?;
    }

    let activity = state.ledger().record_activity(
        licensee_id,
        NewActivity {
            title: req.title,
            completion_date: req.completion_date,
            credit_amount: req.credit_amount,
            credit_type: CreditType::new(req.credit_type)?,
            topics: parse_topics(req.topics)?,
            provider_id: parse_provider(req.provider_id)?,
            certificate_ref: req.certificate_ref,
        },
    )?;
    persist_activity(&state, &activity).await?;

    let mut claims = Vec::new();
    let mut rejected = Vec::new();
    for license_id in targets {
        match claim_under_current_rules(&state, activity.activity_id, license_id) {
            Ok(claim) => claims.push(claim),
            Err(err) => {
                let (_, code) = err.status_and_code();
                rejected.push(ClaimRejection {
                    license_id: *license_id.as_uuid(),
                    code: code.to_string(),
                    message: err.to_string(),
                });
            }
        }
    }
    let compliance = settle_activity(&state, activity.activity_id).await?;

    Ok((
        StatusCode::CREATED,
        Json(ActivityResponse {
            activity,
            claims,
            rejected,
            compliance,
        }),
    ))
}

/// GET /v1/activities/{id}: Read an activity.
#[utoipa::path(
    get,
    path = "/v1/activities/{id}",
    params(("id" = Uuid, Path, description = "Activity ID")),
    responses(
        (status = 200, description = "Activity", body = serde_json::Value),
        (status = 404, description = "Activity not found", body = crate::error::ErrorBody),
    ),
    tag = "activities"
)]
async fn get_activity(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<CmeActivity>, AppError> {
    Ok(Json(visible_activity(
        &state,
        &caller,
        ActivityId::from_uuid(id),
    )?))
}

/// POST /v1/activities/{id}/claims: Claim an activity toward a license.
#[utoipa::path(
    post,
    path = "/v1/activities/{id}/claims",
    params(("id" = Uuid, Path, description = "Activity ID")),
    request_body = ClaimRequest,
    responses(
        (status = 201, description = "Claim recorded (or already active)", body = ClaimResponse),
        (status = 404, description = "Activity or license not found", body = crate::error::ErrorBody),
        (status = 409, description = "Activity superseded", body = crate::error::ErrorBody),
        (status = 422, description = "Claim refused", body = crate::error::ErrorBody),
    ),
    tag = "activities"
)]
async fn claim_activity(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<ClaimRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ClaimResponse>), AppError> {
    let activity_id = ActivityId::from_uuid(id);
    visible_activity(&state, &caller, activity_id)?;
    let req = extract_validated_json(body)?;
    let license_id = LicenseId::from_uuid(req.license_id);
    visible_license(&state, &caller, license_id)?;

    let claim = claim_under_current_rules(&state, activity_id, license_id)?;
    let compliance = settle_activity(&state, activity_id).await?;
    Ok((StatusCode::CREATED, Json(ClaimResponse { claim, compliance })))
}

/// DELETE /v1/activities/{id}/claims/{license_id}: Withdraw a claim.
#[utoipa::path(
    delete,
    path = "/v1/activities/{id}/claims/{license_id}",
    params(
        ("id" = Uuid, Path, description = "Activity ID"),
        ("license_id" = Uuid, Path, description = "License ID"),
    ),
    responses(
        (status = 200, description = "Claim withdrawn", body = ClaimResponse),
        (status = 404, description = "No active claim", body = crate::error::ErrorBody),
    ),
    tag = "activities"
)]
async fn unclaim_activity(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path((id, license_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ClaimResponse>, AppError> {
    let activity_id = ActivityId::from_uuid(id);
    visible_activity(&state, &caller, activity_id)?;
    let license_id = LicenseId::from_uuid(license_id);

    let claim = state.ledger().unclaim_activity(activity_id, license_id)?;
    let compliance = settle_activity(&state, activity_id).await?;
    Ok(Json(ClaimResponse { claim, compliance }))
}

/// POST /v1/activities/{id}/corrections: Replace an activity with a
/// corrected record. Active claims move to the new record.
#[utoipa::path(
    post,
    path = "/v1/activities/{id}/corrections",
    params(("id" = Uuid, Path, description = "Activity ID")),
    request_body = CorrectionRequest,
    responses(
        (status = 201, description = "Corrected record created", body = ActivityResponse),
        (status = 404, description = "Activity not found", body = crate::error::ErrorBody),
        (status = 409, description = "Activity already superseded", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid correction", body = crate::error::ErrorBody),
    ),
    tag = "activities"
)]
async fn correct_activity(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<CorrectionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ActivityResponse>), AppError> {
    let activity_id = ActivityId::from_uuid(id);
    visible_activity(&state, &caller, activity_id)?;
    let req = extract_validated_json(body)?;

    let correction = ActivityCorrection {
        reason: req.reason,
        title: req.title,
        completion_date: req.completion_date,
        credit_amount: req.credit_amount,
        credit_type: req.credit_type.map(CreditType::new).transpose()?,
        topics: req.topics.map(parse_topics).transpose()?,
        provider_id: parse_provider(req.provider_id)?,
        certificate_ref: req.certificate_ref,
    };
    let corrected = state.ledger().correct_activity(activity_id, correction)?;

    let original = state.ledger().activity(activity_id)?;
    persist_activity(&state, &original).await?;
    persist_activity(&state, &corrected).await?;

    // Claims withdrawn from the original were carried to the new record.
    persist_claims(&state, activity_id).await?;
    let compliance = settle_activity(&state, corrected.activity_id).await?;
    let claims = state
        .ledger()
        .claims_for_activity(corrected.activity_id);

    Ok((
        StatusCode::CREATED,
        Json(ActivityResponse {
            activity: corrected,
            claims,
            rejected: Vec::new(),
            compliance,
        }),
    ))
}

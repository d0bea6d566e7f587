//! # Rule Version API
//!
//! Publication is append-only: a new version must take effect strictly
//! after the latest existing one. Publishing re-evaluates every license in
//! the jurisdiction before the response is sent.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::NaiveDate;
use credmate_core::{JurisdictionId, LicenseId};
use credmate_rules::{CompactParticipation, Jurisdiction, RuleSet, RuleVersion};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::{require_role, CallerIdentity, Role};
use crate::db;
use crate::error::AppError;
use crate::extractors::{extract_validated_json, Validate};
use crate::routes::{persist_failed, persist_history, AsOfQuery};
use crate::state::AppState;

/// Publish a rule version.
#[derive(Debug, Deserialize, ToSchema)]
pub struct PublishVersionRequest {
    /// First date the version governs.
    pub effective_from: NaiveDate,
    /// Requirement body: cycle length, total hours, topic quotas, accepted
    /// credit types, grace policy, proration.
    #[schema(value_type = Object)]
    pub rules: RuleSet,
}

impl Validate for PublishVersionRequest {
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PublishVersionResponse {
    #[schema(value_type = Object)]
    pub version: RuleVersion,
    /// Licenses in the jurisdiction re-evaluated under the new history.
    pub licenses_reevaluated: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VersionHistoryResponse {
    #[schema(value_type = Object)]
    pub jurisdiction: Jurisdiction,
    /// Versions in ascending `effective_from` order.
    #[schema(value_type = Vec<Object>)]
    pub versions: Vec<RuleVersion>,
}

/// The version governing a date, with the compact participation in force.
#[derive(Debug, Serialize)]
pub struct EffectiveVersionResponse {
    #[serde(flatten)]
    pub version: RuleVersion,
    pub compact: CompactParticipation,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/rules/:jurisdiction/versions",
            get(list_versions).post(publish_version),
        )
        .route("/v1/rules/:jurisdiction/effective", get(effective_version))
}

/// POST /v1/rules/{jurisdiction}/versions: Publish a rule version (admin).
#[utoipa::path(
    post,
    path = "/v1/rules/{jurisdiction}/versions",
    params(("jurisdiction" = String, Path, description = "Jurisdiction identifier")),
    request_body = PublishVersionRequest,
    responses(
        (status = 201, description = "Version published", body = PublishVersionResponse),
        (status = 404, description = "Unknown jurisdiction", body = crate::error::ErrorBody),
        (status = 409, description = "Effective date overlaps an existing version", body = crate::error::ErrorBody),
        (status = 422, description = "Invalid rule body", body = crate::error::ErrorBody),
    ),
    tag = "rules"
)]
async fn publish_version(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(jurisdiction): Path<String>,
    body: Result<Json<PublishVersionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PublishVersionResponse>), AppError> {
    require_role(&caller, Role::Admin)?;
    let jurisdiction = JurisdictionId::new(jurisdiction)?;
    let req = extract_validated_json(body)?;

    let version = state
        .rules()
        .publish_rule_version(&jurisdiction, req.rules, req.effective_from)?;

    if let Some(pool) = &state.db_pool {
        db::rules::insert_version(pool, &version)
            .await
            .map_err(persist_failed("rule version"))?;
    }

    let engine = state.engine.clone();
    tokio::task::spawn_blocking(move || engine.sync_rule_events())
        .await
        .map_err(|e| AppError::Internal(format!("re-evaluation task failed: {e}")))?;

    let affected: Vec<LicenseId> = state
        .ledger()
        .licenses_in_jurisdiction(&jurisdiction)
        .into_iter()
        .map(|l| l.license_id)
        .collect();
    persist_history(&state, affected.iter().copied()).await?;

    Ok((
        StatusCode::CREATED,
        Json(PublishVersionResponse {
            version: (*version).clone(),
            licenses_reevaluated: affected.len(),
        }),
    ))
}

/// GET /v1/rules/{jurisdiction}/versions: Full version history.
#[utoipa::path(
    get,
    path = "/v1/rules/{jurisdiction}/versions",
    params(("jurisdiction" = String, Path, description = "Jurisdiction identifier")),
    responses(
        (status = 200, description = "Version history", body = VersionHistoryResponse),
        (status = 404, description = "Unknown jurisdiction", body = crate::error::ErrorBody),
    ),
    tag = "rules"
)]
async fn list_versions(
    State(state): State<AppState>,
    Path(jurisdiction): Path<String>,
) -> Result<Json<VersionHistoryResponse>, AppError> {
    let jurisdiction = JurisdictionId::new(jurisdiction)?;
    let history = state.rules().history(&jurisdiction)?;
    Ok(Json(VersionHistoryResponse {
        jurisdiction: history.jurisdiction,
        versions: history
            .versions
            .iter()
            .map(|v| (**v).clone())
            .collect(),
    }))
}

/// GET /v1/rules/{jurisdiction}/effective: The version governing a date.
#[utoipa::path(
    get,
    path = "/v1/rules/{jurisdiction}/effective",
    params(
        ("jurisdiction" = String, Path, description = "Jurisdiction identifier"),
        AsOfQuery,
    ),
    responses(
        (status = 200, description = "Effective rule version", body = serde_json::Value),
        (status = 404, description = "Unknown jurisdiction", body = crate::error::ErrorBody),
        (status = 422, description = "No version effective on the date", body = crate::error::ErrorBody),
    ),
    tag = "rules"
)]
async fn effective_version(
    State(state): State<AppState>,
    Path(jurisdiction): Path<String>,
    Query(query): Query<AsOfQuery>,
) -> Result<Json<EffectiveVersionResponse>, AppError> {
    let jurisdiction = JurisdictionId::new(jurisdiction)?;
    let as_of = query.as_of.unwrap_or_else(|| state.engine.today());
    let version = state.rules().effective_rule_version(&jurisdiction, as_of)?;
    let compact = state.rules().jurisdiction_profile(&jurisdiction, as_of)?;
    Ok(Json(EffectiveVersionResponse {
        version: (*version).clone(),
        compact,
    }))
}

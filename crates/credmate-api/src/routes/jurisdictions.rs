//! # Jurisdiction Registry API
//!
//! Jurisdictions are registered once and never edited. Compact
//! participation changes are published as rule versions instead.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use credmate_core::JurisdictionId;
use credmate_rules::Jurisdiction;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::auth::{require_role, CallerIdentity, Role};
use crate::db;
use crate::error::AppError;
use crate::extractors::{extract_validated_json, Validate};
use crate::routes::persist_failed;
use crate::state::AppState;

/// Register a licensing jurisdiction.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterJurisdictionRequest {
    /// Stable identifier, e.g. `US-TX`.
    pub id: String,
    /// Display name of the board.
    pub name: String,
    #[serde(default)]
    pub imlc_member: bool,
    #[serde(default)]
    pub principal_licensure_eligible: bool,
}

impl Validate for RegisterJurisdictionRequest {
    fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must not be empty".into());
        }
        Ok(())
    }
}

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/v1/jurisdictions",
        get(list_jurisdictions).post(register_jurisdiction),
    )
}

/// POST /v1/jurisdictions: Register a jurisdiction (admin).
///
/// Returns 201 for a new registration and 200 when an identical
/// definition already exists.
#[utoipa::path(
    post,
    path = "/v1/jurisdictions",
    request_body = RegisterJurisdictionRequest,
    responses(
        (status = 201, description = "Jurisdiction registered", body = serde_json::Value),
        (status = 200, description = "Identical jurisdiction already registered", body = serde_json::Value),
        (status = 409, description = "A different definition uses the identifier", body = crate::error::ErrorBody),
    ),
    tag = "jurisdictions"
)]
async fn register_jurisdiction(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<RegisterJurisdictionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Jurisdiction>), AppError> {
    require_role(&caller, Role::Admin)?;
    let req = extract_validated_json(body)?;
    let jurisdiction = Jurisdiction {
        id: JurisdictionId::new(req.id)?,
        name: req.name.trim().to_string(),
        imlc_member: req.imlc_member,
        principal_licensure_eligible: req.principal_licensure_eligible,
    };

    let created = state.rules().register_jurisdiction(jurisdiction.clone())?;
    if created {
        if let Some(pool) = &state.db_pool {
            db::rules::insert_jurisdiction(pool, &jurisdiction)
                .await
                .map_err(persist_failed("jurisdiction"))?;
        }
    }

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(jurisdiction)))
}

/// GET /v1/jurisdictions: List registered jurisdictions.
#[utoipa::path(
    get,
    path = "/v1/jurisdictions",
    responses(
        (status = 200, description = "Registered jurisdictions", body = serde_json::Value),
    ),
    tag = "jurisdictions"
)]
async fn list_jurisdictions(State(state): State<AppState>) -> Json<Vec<Jurisdiction>> {
    Json(state.rules().jurisdictions())
}

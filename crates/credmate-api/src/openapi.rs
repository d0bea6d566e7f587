//! # OpenAPI Specification Assembly
//!
//! Assembles all utoipa-documented routes into a single OpenAPI 3.1 spec
//! served at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::state::AppState;

/// Assembled OpenAPI spec for the entire API surface.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "CredentialMate Compliance Engine",
        version = "0.1.0",
        description = "Multi-jurisdiction CME compliance tracking: jurisdiction rule versions, licenses, activities and claims, compliance snapshots and their history.",
        license(name = "BUSL-1.1")
    ),
    paths(
        // Jurisdictions
        crate::routes::jurisdictions::register_jurisdiction,
        crate::routes::jurisdictions::list_jurisdictions,
        // Rules
        crate::routes::rules::publish_version,
        crate::routes::rules::list_versions,
        crate::routes::rules::effective_version,
        // Licenses
        crate::routes::licenses::register_license,
        crate::routes::licenses::list_licenses,
        crate::routes::licenses::get_license,
        crate::routes::licenses::record_renewal,
        crate::routes::licenses::transition_status,
        crate::routes::licenses::record_board_audit,
        crate::routes::licenses::record_audit_response,
        crate::routes::licenses::record_verification,
        // Compliance
        crate::routes::compliance::get_compliance,
        crate::routes::compliance::evaluate,
        crate::routes::compliance::get_history,
        crate::routes::compliance::get_notifications,
        // Activities
        crate::routes::activities::record_activity,
        crate::routes::activities::get_activity,
        crate::routes::activities::claim_activity,
        crate::routes::activities::unclaim_activity,
        crate::routes::activities::correct_activity,
    ),
    components(schemas(
        // Error types
        crate::error::ErrorBody,
        crate::error::ErrorDetail,
        crate::auth::Role,
        // Jurisdiction DTOs
        crate::routes::jurisdictions::RegisterJurisdictionRequest,
        // Rule DTOs
        crate::routes::rules::PublishVersionRequest,
        crate::routes::rules::PublishVersionResponse,
        crate::routes::rules::VersionHistoryResponse,
        // License DTOs
        crate::routes::licenses::RegisterLicenseRequest,
        crate::routes::licenses::RenewalRequest,
        crate::routes::licenses::StatusTransitionRequest,
        crate::routes::licenses::BoardAuditRequest,
        crate::routes::licenses::AuditResponseRequest,
        crate::routes::licenses::VerificationRequest,
        crate::routes::licenses::LicenseResponse,
        crate::routes::licenses::BoardAuditResponse,
        crate::routes::licenses::ObservationResponse,
        // Compliance DTOs
        crate::routes::compliance::EvaluationResponse,
        crate::routes::compliance::HistoryResponse,
        // Activity DTOs
        crate::routes::activities::RecordActivityRequest,
        crate::routes::activities::ClaimRequest,
        crate::routes::activities::CorrectionRequest,
        crate::routes::activities::ClaimRejection,
        crate::routes::activities::ActivityResponse,
        crate::routes::activities::ClaimResponse,
    )),
    tags(
        (name = "jurisdictions", description = "Licensing jurisdiction registry"),
        (name = "rules", description = "Effective-dated CME rule versions"),
        (name = "licenses", description = "Licenses, renewals, status and board audits"),
        (name = "compliance", description = "Compliance snapshots, history and notifications"),
        (name = "activities", description = "CME activities and claims"),
    )
)]
pub struct ApiDoc;

/// Serves the OpenAPI JSON spec at `/openapi.json`.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

/// GET /openapi.json: Return the generated OpenAPI specification.
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

//! # credmate-api: Axum API Service for CredentialMate
//!
//! HTTP surface of the compliance engine: jurisdiction and rule-version
//! administration, credential ledger writes, compliance snapshots and their
//! history, pending notifications, and verification-feed ingestion. The
//! binary also runs the scheduled re-evaluation sweep.
//!
//! ## API Surface
//!
//! | Prefix                      | Module                        | Domain            |
//! |-----------------------------|-------------------------------|-------------------|
//! | `/v1/jurisdictions`         | [`routes::jurisdictions`]     | Rule store        |
//! | `/v1/rules/*`               | [`routes::rules`]             | Rule store        |
//! | `/v1/licenses/*`            | [`routes::licenses`]          | Ledger            |
//! | `/v1/licenses/{id}/compliance` etc. | [`routes::compliance`] | Snapshots       |
//! | `/v1/activities/*`          | [`routes::activities`]        | Ledger            |
//! | `/health/*`, `/metrics`     | this module                   | Operations        |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → MetricsMiddleware → AuthMiddleware → Handler
//! ```
//!
//! ## OpenAPI
//!
//! Auto-generated OpenAPI 3.1 spec via utoipa derive macros at `/openapi.json`.

pub mod auth;
pub mod bootstrap;
pub mod db;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;
pub mod verification;

use axum::extract::State;
use axum::http::header;
use axum::middleware::from_fn;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Router};
use tower_http::trace::TraceLayer;

use crate::auth::AuthConfig;
use crate::middleware::metrics::ApiMetrics;
use crate::state::AppState;

/// Assemble the full application router with all routes and middleware.
///
/// Health probes (`/health/*`) and `/metrics` are mounted outside the auth
/// middleware so they remain accessible without credentials.
pub fn app(state: AppState) -> Router {
    let auth_config = AuthConfig {
        token: state.config.auth_token.clone(),
    };
    let metrics = ApiMetrics::new();

    // Authenticated API routes.
    let api = Router::new()
        .merge(routes::jurisdictions::router())
        .merge(routes::rules::router())
        .merge(routes::licenses::router())
        .merge(routes::compliance::router())
        .merge(routes::activities::router())
        .merge(openapi::router())
        .layer(from_fn(auth::auth_middleware))
        .layer(from_fn(middleware::metrics::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(auth_config))
        .layer(Extension(metrics.clone()))
        .with_state(state.clone());

    // Unauthenticated probes and counters.
    let ops = Router::new()
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness))
        .route("/metrics", get(prometheus_metrics))
        .layer(Extension(metrics))
        .with_state(state);

    Router::new().merge(ops).merge(api)
}

/// Liveness probe: always returns 200 if the process is running.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe: returns 200 when the application is ready to serve.
async fn readiness() -> &'static str {
    "ready"
}

/// GET /metrics: request and engine counters in Prometheus text format.
async fn prometheus_metrics(
    State(state): State<AppState>,
    Extension(metrics): Extension<ApiMetrics>,
) -> impl IntoResponse {
    let body = metrics.render(&state.engine.metrics().snapshot());
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}

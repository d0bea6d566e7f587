//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Domain errors from the rule store, ledger, evaluator and engine keep
//! their machine-readable kind as the response `code`, so clients can tell
//! an unaccepted credit type from an activity outside the cycle without
//! parsing messages. Internal error details are never returned.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use credmate_compliance::EvaluationError;
use credmate_ledger::LedgerError;
use credmate_monitor::MonitorError;
use credmate_rules::RuleStoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g. `UNACCEPTED_CREDIT_TYPE`).
    pub code: String,
    /// Human-readable explanation.
    pub message: String,
    /// Additional context, present only for client errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Request validation failed (422).
    #[error("validation error: {0}")]
    Validation(String),

    /// Request body could not be parsed (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing or invalid token (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Insufficient role (403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Conflict with current resource state (409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A domain error carrying its own status and kind code.
    #[error("{message}")]
    Domain {
        status: StatusCode,
        code: &'static str,
        message: String,
    },

    /// A dependency is temporarily unavailable (503).
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// Internal server error (500). Logged, never returned to the client.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status and machine-readable code for this error.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Self::Domain { status, code, .. } => (*status, code),
            Self::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    fn domain(status: StatusCode, code: &'static str, message: impl ToString) -> Self {
        Self::Domain {
            status,
            code,
            message: message.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        };

        if matches!(&self, Self::Internal(_)) {
            tracing::error!(error = %self, "internal server error");
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<credmate_core::ValidationError> for AppError {
    fn from(err: credmate_core::ValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<RuleStoreError> for AppError {
    fn from(err: RuleStoreError) -> Self {
        let status = match &err {
            RuleStoreError::UnknownJurisdiction(_) => StatusCode::NOT_FOUND,
            RuleStoreError::JurisdictionConflict { .. }
            | RuleStoreError::OverlappingEffectiveRange { .. } => StatusCode::CONFLICT,
            RuleStoreError::RestoreOutOfOrder { .. } | RuleStoreError::Canonicalization(_) => {
                return Self::Internal(err.to_string());
            }
            RuleStoreError::InvalidRuleVersion { .. }
            | RuleStoreError::NoVersionsPublished(_)
            | RuleStoreError::NoEffectiveVersion { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        };
        Self::domain(status, err.kind(), err)
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        let status = if err.is_not_found() {
            StatusCode::NOT_FOUND
        } else {
            match &err {
                LedgerError::DuplicateLicense { .. }
                | LedgerError::ActivitySuperseded { .. }
                | LedgerError::RenewalNotAdvancing { .. }
                | LedgerError::LicenseRevoked(_)
                | LedgerError::InvalidStatusTransition { .. }
                | LedgerError::AuditAlreadyResponded(_) => StatusCode::CONFLICT,
                _ => StatusCode::UNPROCESSABLE_ENTITY,
            }
        };
        Self::domain(status, err.kind(), err)
    }
}

impl From<EvaluationError> for AppError {
    fn from(err: EvaluationError) -> Self {
        match &err {
            EvaluationError::Digest(_) => Self::Internal(err.to_string()),
            _ => Self::domain(StatusCode::UNPROCESSABLE_ENTITY, err.kind(), err),
        }
    }
}

impl From<MonitorError> for AppError {
    fn from(err: MonitorError) -> Self {
        match err {
            MonitorError::Rules(e) => e.into(),
            MonitorError::Ledger(e) => e.into(),
            MonitorError::Evaluation(e) => e.into(),
            e @ (MonitorError::Timeout { .. } | MonitorError::Transient(_)) => {
                Self::domain(StatusCode::SERVICE_UNAVAILABLE, e.kind(), e)
            }
            e @ (MonitorError::TaskFailed(_) | MonitorError::History(_)) => {
                Self::Internal(e.to_string())
            }
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::Internal(format!("database: {err}"))
    }
}

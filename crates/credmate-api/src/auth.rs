//! # Bearer Authentication and Roles
//!
//! Bearer token middleware with role-based access control.
//!
//! ## Token Format
//!
//! ```text
//! Bearer {role}:{licensee_id}:{secret}   role-scoped
//! Bearer {secret}                        legacy (treated as admin)
//! ```
//!
//! Roles are `licensee < reviewer < admin`. Licensees see and write only
//! their own licenses and activities; reviewers may read everything and
//! move license status; admins also manage jurisdictions and rules.
//!
//! The middleware resolves the token to a [`CallerIdentity`] and stores it
//! on the request; handlers take it as an extractor argument.

use axum::extract::Request;
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use credmate_core::LicenseeId;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use utoipa::ToSchema;

use crate::error::{AppError, ErrorBody, ErrorDetail};

// ── Role ────────────────────────────────────────────────────────────────────

/// Caller roles, ordered by privilege: `Licensee < Reviewer < Admin`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// A physician acting on their own records.
    Licensee,
    /// Compliance staff. Reads everything, records status changes.
    Reviewer,
    /// Full access, including rule administration.
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Licensee => "licensee",
            Self::Reviewer => "reviewer",
            Self::Admin => "admin",
        }
    }
}

// ── CallerIdentity ──────────────────────────────────────────────────────────

/// Identity of the authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    /// The caller's role.
    pub role: Role,
    /// The licensee the caller acts for. Always set for the licensee role.
    pub licensee_id: Option<LicenseeId>,
}

impl CallerIdentity {
    pub fn admin() -> Self {
        Self {
            role: Role::Admin,
            licensee_id: None,
        }
    }

    /// Check if the caller has at least the given minimum role.
    pub fn has_role(&self, minimum: Role) -> bool {
        self.role >= minimum
    }

    /// Reviewers and admins reach every licensee; licensees only themselves.
    pub fn can_access_licensee(&self, licensee_id: LicenseeId) -> bool {
        match self.role {
            Role::Admin | Role::Reviewer => true,
            Role::Licensee => self.licensee_id == Some(licensee_id),
        }
    }
}

#[axum::async_trait]
impl<S: Send + Sync> axum::extract::FromRequestParts<S> for CallerIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CallerIdentity>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("no caller identity in request context".into()))
    }
}

/// Check that the caller has at least the required role.
pub fn require_role(caller: &CallerIdentity, minimum: Role) -> Result<(), AppError> {
    if caller.has_role(minimum) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "role '{}' required, caller has '{}'",
            minimum.as_str(),
            caller.role.as_str()
        )))
    }
}

/// Check that the caller may act for `licensee_id`.
pub fn require_licensee_access(
    caller: &CallerIdentity,
    licensee_id: LicenseeId,
) -> Result<(), AppError> {
    if caller.can_access_licensee(licensee_id) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "caller may not access records of licensee {licensee_id}"
        )))
    }
}

// ── Auth Configuration ──────────────────────────────────────────────────────

/// Auth configuration injected into request extensions.
///
/// Custom `Debug` redacts the token value.
#[derive(Clone)]
pub struct AuthConfig {
    pub token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

// ── Token Validation ────────────────────────────────────────────────────────

/// Constant-time comparison of bearer secrets.
fn constant_time_token_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

/// Parse a bearer token in format `{role}:{licensee_id}:{secret}` or
/// `{secret}` (legacy admin).
pub fn parse_bearer_token(provided: &str, expected_secret: &str) -> Result<CallerIdentity, String> {
    let parts: Vec<&str> = provided.splitn(3, ':').collect();

    match parts.len() {
        1 => {
            if constant_time_token_eq(provided, expected_secret) {
                Ok(CallerIdentity::admin())
            } else {
                Err("invalid bearer token".into())
            }
        }
        3 => {
            let (role_str, licensee_str, secret) = (parts[0], parts[1], parts[2]);

            if !constant_time_token_eq(secret, expected_secret) {
                return Err("invalid bearer token".into());
            }

            let role = match role_str {
                "admin" => Role::Admin,
                "reviewer" => Role::Reviewer,
                "licensee" => Role::Licensee,
                other => return Err(format!("unknown role: {other}")),
            };

            let licensee_id = if licensee_str.is_empty() {
                None
            } else {
                Some(
                    licensee_str
                        .parse::<LicenseeId>()
                        .map_err(|e| format!("invalid licensee_id: {e}"))?,
                )
            };

            if role == Role::Licensee && licensee_id.is_none() {
                return Err("licensee tokens must name a licensee_id".into());
            }

            Ok(CallerIdentity { role, licensee_id })
        }
        _ => Err(
            "invalid token format, expected {role}:{licensee_id}:{secret} or {secret}".into(),
        ),
    }
}

// ── Middleware ───────────────────────────────────────────────────────────────

/// Validate the bearer token and inject the caller's identity.
///
/// When `AuthConfig.token` is `None` every request runs as admin
/// (development mode).
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let expected_token = request.extensions().get::<AuthConfig>().cloned();

    match expected_token {
        Some(AuthConfig {
            token: Some(ref expected),
        }) => {
            let auth_header = request
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok());

            match auth_header.and_then(|h| h.strip_prefix("Bearer ")) {
                Some(provided) => match parse_bearer_token(provided, expected) {
                    Ok(identity) => {
                        request.extensions_mut().insert(identity);
                        next.run(request).await
                    }
                    Err(msg) => {
                        tracing::warn!(reason = %msg, "authentication failed: invalid bearer token");
                        unauthorized_response(&msg)
                    }
                },
                None if auth_header.is_some() => {
                    tracing::warn!("authentication failed: non-Bearer authorization scheme");
                    unauthorized_response("authorization header must use Bearer scheme")
                }
                None => {
                    tracing::warn!("authentication failed: missing authorization header");
                    unauthorized_response("missing authorization header")
                }
            }
        }
        _ => {
            request.extensions_mut().insert(CallerIdentity::admin());
            next.run(request).await
        }
    }
}

fn unauthorized_response(message: &str) -> Response {
    let body = ErrorBody {
        error: ErrorDetail {
            code: "UNAUTHORIZED".to_string(),
            message: message.to_string(),
            details: None,
        },
    };
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}

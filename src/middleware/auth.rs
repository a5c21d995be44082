//! Authentication middleware for Axum
//!
//! Checks the configured bearer token on API requests. Provides the
//! `RequireAuth` extractor for handlers.

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

/// Token check installed on the router as an `Extension`
#[derive(Debug, Clone, Default)]
pub struct ApiAuth {
    token: Option<String>,
}

impl ApiAuth {
    /// Require `token` on every API request; `None` or empty disables auth
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.filter(|t| !t.is_empty()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.token.is_some()
    }

    fn verify(&self, presented: Option<&str>) -> std::result::Result<(), AuthRejection> {
        let Some(expected) = self.token.as_deref() else {
            return Ok(());
        };
        match presented {
            None => Err(AuthRejection::missing()),
            Some(token) if token == expected => Ok(()),
            Some(_) => Err(AuthRejection::invalid()),
        }
    }
}

/// JSON error response for auth failures
#[derive(Debug, Serialize)]
struct AuthErrorResponse {
    success: bool,
    error: String,
    code: &'static str,
}

/// Auth rejection type
#[derive(Debug)]
pub struct AuthRejection {
    status: StatusCode,
    body: AuthErrorResponse,
}

impl AuthRejection {
    fn new(status: StatusCode, error: impl Into<String>, code: &'static str) -> Self {
        Self {
            status,
            body: AuthErrorResponse {
                success: false,
                error: error.into(),
                code,
            },
        }
    }

    fn missing() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "Authentication required. Provide Authorization: Bearer <token>.",
            "UNAUTHORIZED",
        )
    }

    fn invalid() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "Invalid token",
            "INVALID_CREDENTIALS",
        )
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

// ============================================================================
// RequireAuth Extractor
// ============================================================================

/// Axum extractor that requires a valid token when auth is enabled.
///
/// The token is read from:
/// 1. `Authorization: Bearer <token>` header
/// 2. `X-API-Key: <token>` header
/// 3. `?token=<token>` query parameter (for EventSource, which cannot set headers)
pub struct RequireAuth;

#[async_trait::async_trait]
impl<S> FromRequestParts<S> for RequireAuth
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let auth = parts.extensions.get::<Arc<ApiAuth>>().ok_or_else(|| {
            AuthRejection::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Authentication not configured",
                "INTERNAL_ERROR",
            )
        })?;

        auth.verify(extract_token(parts).as_deref())?;
        Ok(RequireAuth)
    }
}

/// Extract token from request headers or query params
fn extract_token(parts: &Parts) -> Option<String> {
    if let Some(value) = parts
        .headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
    {
        if let Some(token) = value.strip_prefix("Bearer ") {
            return Some(token.trim().to_string());
        }
    }

    if let Some(value) = parts.headers.get("x-api-key").and_then(|h| h.to_str().ok()) {
        return Some(value.trim().to_string());
    }

    parts.uri.query().and_then(|query| {
        query
            .split('&')
            .find_map(|param| param.strip_prefix("token="))
            .map(str::to_string)
    })
}

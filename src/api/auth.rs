//! Bearer-token authentication for the REST API

use super::routes::AppState;
use crate::config::ApiKeyPolicy;
use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};

/// Authentication failures, rendered in the same JSON shape as other API errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// No key configured on the server
    NotConfigured,
    MissingToken,
    InvalidToken,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotConfigured => (
                StatusCode::SERVICE_UNAVAILABLE,
                "API authentication is not configured. Set DEVON_API_KEY, or DEVON_API_KEY=disable to turn it off",
            ),
            Self::MissingToken => (StatusCode::UNAUTHORIZED, "Missing bearer token"),
            Self::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid bearer token"),
        };

        let body = Json(serde_json::json!({
            "error": message,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }));

        let mut response = (status, body).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

/// Check a request's `Authorization` header against the policy
pub fn authorize(policy: &ApiKeyPolicy, authorization: Option<&str>) -> Result<(), AuthError> {
    let expected = match policy {
        ApiKeyPolicy::Disabled => return Ok(()),
        ApiKeyPolicy::Unconfigured => return Err(AuthError::NotConfigured),
        ApiKeyPolicy::Required(key) => key,
    };

    let token = authorization
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::MissingToken)?;

    if constant_time_eq(token.as_bytes(), expected.as_bytes()) {
        Ok(())
    } else {
        Err(AuthError::InvalidToken)
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Axum middleware guarding every route it is layered on
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    if let Err(e) = authorize(&state.api_key, authorization) {
        tracing::warn!(
            method = %request.method(),
            path = %request.uri().path(),
            reason = ?e,
            "Request rejected"
        );
        return Err(e);
    }

    Ok(next.run(request).await)
}

//! HTTP error responses for API callers.
//!
//! `AuthError` implements `IntoResponse` so that API handlers (and the
//! gatekeeper, for API-classified routes) can surface any failure as a
//! structured JSON body with a stable status code. Browser navigations
//! never see these: the gatekeeper converts their failures into
//! redirects before this mapping applies.

use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::error::AuthError;
use crate::token::ValidationFailure;

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = error_details(&self);

        let mut headers = HeaderMap::new();
        if status == StatusCode::UNAUTHORIZED {
            let www_auth = build_www_authenticate_header(&message);
            if let Ok(value) = HeaderValue::from_str(&www_auth) {
                headers.insert(header::WWW_AUTHENTICATE, value);
            }
        }

        (status, headers, Json(json!({ "error": message }))).into_response()
    }
}

/// Maps an error onto its HTTP status and client-safe message.
///
/// Server-side failures deliberately collapse to a generic message;
/// internals belong in logs, not response bodies.
fn error_details(error: &AuthError) -> (StatusCode, String) {
    match error {
        AuthError::Unauthorized { message } => (StatusCode::UNAUTHORIZED, message.clone()),
        // A key-service outage is the server's problem, not the caller's.
        AuthError::Validation(ValidationFailure::KeyService { .. }) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "authentication service unavailable".to_string(),
        ),
        AuthError::Validation(failure) => (StatusCode::UNAUTHORIZED, failure.to_string()),
        AuthError::TenantMissing => (
            StatusCode::BAD_REQUEST,
            "tenant selection required".to_string(),
        ),
        AuthError::Forbidden { message } => (StatusCode::FORBIDDEN, message.clone()),
        AuthError::ServiceUnavailable { .. } => (
            StatusCode::SERVICE_UNAVAILABLE,
            "authentication service unavailable".to_string(),
        ),
        AuthError::Configuration { .. } | AuthError::Internal { .. } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal error".to_string(),
        ),
    }
}

/// Builds the WWW-Authenticate header value for 401 responses.
fn build_www_authenticate_header(description: &str) -> String {
    let escaped = description.replace('"', "\\\"");
    format!("Bearer realm=\"tessera\", error=\"invalid_token\", error_description=\"{escaped}\"")
}

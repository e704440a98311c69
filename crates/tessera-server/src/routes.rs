//! Route handlers.
//!
//! The handful of routes the bridge exposes directly, plus one sample
//! business route showing how a module router consumes the tenant
//! context. The dashboard UI itself is served by the web frontend and
//! is not this server's concern; the page handlers here are the plain
//! targets the gatekeeper redirects to.

use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::Json;
use serde_json::{Value, json};

use tessera_auth::error::AuthError;
use tessera_auth::middleware::{CurrentTenant, CurrentToken};
use tessera_db::{DbError, TenantClient};

use crate::state::AppState;

/// Role required for the operational endpoints.
const ADMIN_ROLE: &str = "admin";

// =============================================================================
// Error Plumbing
// =============================================================================

/// Failures a route handler can surface.
pub enum ApiError {
    /// Authentication/authorization failure.
    Auth(AuthError),
    /// Data-access failure.
    Db(DbError),
}

impl From<AuthError> for ApiError {
    fn from(error: AuthError) -> Self {
        Self::Auth(error)
    }
}

impl From<DbError> for ApiError {
    fn from(error: DbError) -> Self {
        Self::Db(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Auth(error) => error.into_response(),
            Self::Db(error) => {
                let status = match &error {
                    DbError::ServiceUnavailable { .. } => {
                        axum::http::StatusCode::SERVICE_UNAVAILABLE
                    }
                    DbError::Request { status, .. } => {
                        axum::http::StatusCode::from_u16(*status)
                            .unwrap_or(axum::http::StatusCode::BAD_GATEWAY)
                    }
                    _ => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                };
                tracing::warn!(error = %error, "Data request failed");
                (status, Json(json!({ "error": "data request failed" }))).into_response()
            }
        }
    }
}

// =============================================================================
// Public Routes
// =============================================================================

/// Liveness probe.
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Sign-in page. The web frontend replaces this; the server only needs
/// the route to exist as a redirect target.
pub async fn sign_in_page() -> Html<&'static str> {
    Html("<h1>Sign in</h1><p>Authenticate with your identity provider to continue.</p>")
}

/// Tenant selection page for users whose token carries no tenant.
pub async fn select_tenant_page() -> Html<&'static str> {
    Html("<h1>Select a tenant</h1><p>Your account belongs to more than one organization.</p>")
}

/// Generic error page for failed browser navigations.
pub async fn error_page() -> Html<&'static str> {
    Html("<h1>Something went wrong</h1><p>Please try again or sign in.</p>")
}

// =============================================================================
// Session Routes
// =============================================================================

/// Returns the caller's resolved tenant context.
pub async fn session(CurrentTenant(context): CurrentTenant) -> Json<Value> {
    let mut permissions: Vec<&String> = context.permissions.iter().collect();
    permissions.sort();

    Json(json!({
        "user_id": context.user_id,
        "tenant_id": context.tenant_id,
        "roles": context.roles,
        "permissions": permissions,
        "tenant_source": context.tenant_source,
    }))
}

/// Signs the caller out: evicts the token's cache entry and expires the
/// session cookie.
pub async fn sign_out(
    State(state): State<AppState>,
    CurrentToken(token): CurrentToken,
) -> Response {
    state.auth.cache.clear_token(&token.fingerprint()).await;

    let mut response =
        Redirect::to(&state.auth.config.routes.sign_in_path).into_response();
    let removal = state
        .auth
        .config
        .cookie
        .removal_cookie(&state.auth.config.cookie.name);
    if let Ok(value) = removal.parse() {
        response.headers_mut().append(SET_COOKIE, value);
    }

    tracing::debug!("Signed out, session cookie expired");
    response
}

// =============================================================================
// Business Routes
// =============================================================================

/// Sample inventory listing.
///
/// Builds a tenant-scoped client for the caller and lets the data API's
/// row-level policies bound what comes back.
pub async fn inventory(
    State(state): State<AppState>,
    CurrentTenant(context): CurrentTenant,
    CurrentToken(token): CurrentToken,
) -> Result<Json<Value>, ApiError> {
    context.require_permission("inventory:read")?;

    let client = TenantClient::new(&state.data, &context, &token)?;
    let items: Vec<Value> = client
        .fetch("inventory_items", &[("select", "*"), ("order", "sku")])
        .await?;

    Ok(Json(json!({ "tenant": context.tenant_id, "items": items })))
}

// =============================================================================
// Operational Routes
// =============================================================================

/// Failure-monitor status for operators.
pub async fn auth_health(
    State(state): State<AppState>,
    CurrentTenant(context): CurrentTenant,
) -> Result<Json<Value>, ApiError> {
    if !context.has_role(ADMIN_ROLE) {
        return Err(AuthError::forbidden("administrative role required").into());
    }

    let monitor = &state.auth.monitor;
    let pattern = monitor.detected_pattern().await;

    Ok(Json(json!({
        "repeating_pattern": pattern.is_some(),
        "pattern": pattern.map(|kind| kind.to_string()),
        "recommendations": monitor.recommendations().await,
        "recorded_failures": monitor.len().await,
    })))
}

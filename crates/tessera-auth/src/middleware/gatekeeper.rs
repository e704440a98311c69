//! Request gatekeeper.
//!
//! Orchestrates the bridge per inbound request: route classification,
//! token extraction, cache lookup, validation, claims transformation,
//! and context injection, plus the full failure matrix. This is the
//! single place that converts internal failures into HTTP outcomes;
//! nothing leaks past it unhandled.
//!
//! Terminal outcomes per request: proceed with an attached context,
//! redirect (sign-in, tenant selection, generic error page), or reject
//! with a status. Running the gatekeeper twice on the same request is
//! safe: the only mutating side effect is cookie clearing on the
//! corruption recovery path, and clearing an absent cookie is a no-op.
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, middleware, routing::get};
//! use tessera_auth::middleware::{AuthState, CurrentTenant, gatekeeper};
//!
//! async fn inventory(CurrentTenant(ctx): CurrentTenant) -> String {
//!     format!("tenant: {}", ctx.tenant_id)
//! }
//!
//! let app: Router = Router::new()
//!     .route("/api/inventory", get(inventory))
//!     .layer(middleware::from_fn_with_state(auth_state.clone(), gatekeeper));
//! ```

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{
        Request,
        header::{COOKIE, SET_COOKIE},
        request::Parts,
    },
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};

use crate::cache::ContextCache;
use crate::claims::{TenantContext, transform};
use crate::config::{AuthConfig, CookieConfig, RouteConfig};
use crate::error::AuthError;
use crate::extract::{BearerToken, TokenSource, extract_token};
use crate::jwks::{KeySetCache, KeySetCacheConfig};
use crate::monitor::AuthMonitor;
use crate::token::{TokenValidator, ValidationFailure};

// =============================================================================
// Auth State
// =============================================================================

/// Shared state for the gatekeeper and the auth endpoints.
///
/// Constructed once at startup; every component is behind an `Arc`, so
/// cloning per request is cheap.
#[derive(Clone)]
pub struct AuthState {
    /// Token validator.
    pub validator: Arc<TokenValidator>,

    /// Validated-claims cache.
    pub cache: Arc<ContextCache>,

    /// Failure monitor.
    pub monitor: Arc<AuthMonitor>,

    /// Signing key cache (exposed for operational invalidation).
    pub key_cache: Arc<KeySetCache>,

    /// Bridge configuration.
    pub config: Arc<AuthConfig>,
}

impl AuthState {
    /// Builds the full component stack from configuration.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` when the key-set URL is
    /// invalid or uses a disallowed scheme.
    pub fn from_config(config: AuthConfig, keys: KeySetCacheConfig) -> Result<Self, AuthError> {
        let endpoint = url::Url::parse(&config.provider.jwks_url)
            .map_err(|e| AuthError::configuration(format!("invalid jwks_url: {e}")))?;

        let key_cache = Arc::new(
            KeySetCache::new(endpoint, keys, config.retry.clone())
                .map_err(|e| AuthError::configuration(e.to_string()))?,
        );

        Ok(Self {
            validator: Arc::new(TokenValidator::new(Arc::clone(&key_cache), &config.provider)),
            cache: Arc::new(ContextCache::new(config.cache.ttl)),
            monitor: Arc::new(AuthMonitor::new(&config.monitor)),
            key_cache,
            config: Arc::new(config),
        })
    }
}

// =============================================================================
// Route Classification
// =============================================================================

/// How a route is treated by the gatekeeper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    /// Reachable without a credential.
    Public,
    /// Protected; failures answered with JSON errors.
    Api,
    /// Protected; failures answered with redirects.
    Page,
}

/// Classifies a request path. Public prefixes win over API prefixes.
#[must_use]
pub fn classify_route(path: &str, routes: &RouteConfig) -> RouteClass {
    if routes.public_prefixes.iter().any(|p| path.starts_with(p.as_str())) {
        RouteClass::Public
    } else if routes.api_prefixes.iter().any(|p| path.starts_with(p.as_str())) {
        RouteClass::Api
    } else {
        RouteClass::Page
    }
}

// =============================================================================
// Pipeline
// =============================================================================

/// Resolves a tenant context for a token: cache lookup, validation on
/// miss, then claims transformation.
///
/// The cache is only written after a fully successful validation, so an
/// abandoned request leaves no residue.
///
/// # Errors
///
/// Any [`AuthError`] from validation or transformation.
pub async fn resolve_context(
    state: &AuthState,
    token: &BearerToken,
) -> Result<TenantContext, AuthError> {
    let fingerprint = token.fingerprint();

    let claims = match state.cache.get(&fingerprint).await {
        Some(claims) => {
            tracing::trace!(token = %fingerprint, "Context cache hit");
            claims
        }
        None => {
            let claims = Arc::new(state.validator.validate(token).await?);
            state.cache.put(fingerprint, Arc::clone(&claims)).await;
            claims
        }
    };

    transform(&claims, &state.config.tenant)
}

// =============================================================================
// Gatekeeper Middleware
// =============================================================================

/// Axum middleware running the full gatekeeper state machine.
pub async fn gatekeeper(
    State(state): State<AuthState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let (parts, body) = req.into_parts();
    let path = parts.uri.path().to_string();
    let route = classify_route(&path, &state.config.routes);

    let Some((token, source)) = extract_token(&parts, &state.config.cookie, &state.config.routes)
    else {
        // Absence is a routing decision, not a failure.
        return match route {
            RouteClass::Public => next.run(Request::from_parts(parts, body)).await,
            RouteClass::Api => {
                AuthError::unauthorized("authentication required").into_response()
            }
            RouteClass::Page => {
                tracing::debug!(path = %path, "Unauthenticated page navigation, redirecting to sign-in");
                sign_in_redirect(&state.config.routes, &path, None)
            }
        };
    };

    match resolve_context(&state, &token).await {
        Ok(context) => {
            tracing::debug!(
                tenant = %context.tenant_id,
                user = %context.user_id,
                fallback_tenant = context.is_fallback_tenant(),
                "Request proceeding with tenant context"
            );
            let mut req = Request::from_parts(parts, body);
            req.extensions_mut().insert(context);
            req.extensions_mut().insert(token);
            next.run(req).await
        }
        Err(error) => {
            if let Some(kind) = error.failure_kind() {
                state.monitor.record(kind, &error.to_string(), &path).await;
            }

            if route == RouteClass::Public {
                // A bad credential must not lock users out of public
                // routes (the sign-in page above all).
                tracing::debug!(path = %path, error = %error, "Ignoring invalid credential on public route");
                return next.run(Request::from_parts(parts, body)).await;
            }

            failure_response(&state, &parts, route, &path, source, error)
        }
    }
}

/// Converts a pipeline failure into its HTTP outcome.
fn failure_response(
    state: &AuthState,
    parts: &Parts,
    route: RouteClass,
    path: &str,
    source: TokenSource,
    error: AuthError,
) -> Response {
    // A malformed credential stored in a cookie is the corruption
    // signature: recover by deleting the auth cookies and starting a
    // fresh sign-in.
    if source == TokenSource::Cookie
        && matches!(
            error,
            AuthError::Validation(ValidationFailure::Malformed { .. })
        )
    {
        tracing::warn!(path = %path, "Corrupted session cookie, clearing auth cookies");
        let mut response = sign_in_redirect(&state.config.routes, path, Some("session_corrupted"));
        append_cookie_removals(&mut response, parts, &state.config.cookie);
        return response;
    }

    match route {
        RouteClass::Api => {
            tracing::debug!(path = %path, error = %error, "Rejecting API request");
            // `IntoResponse` carries the status matrix for API callers.
            error.into_response()
        }
        RouteClass::Page => match error {
            AuthError::TenantMissing => {
                tracing::debug!(path = %path, "Authenticated without tenant, redirecting to selection");
                redirect_with_return(&state.config.routes.tenant_select_path, path, None)
            }
            other => {
                tracing::debug!(path = %path, error = %other, "Redirecting failed navigation to error page");
                redirect_with_return(&state.config.routes.error_path, path, Some("auth"))
            }
        },
        RouteClass::Public => unreachable!("public failures handled by caller"),
    }
}

/// Redirect to the sign-in page, preserving the originally requested
/// path for post-login return.
fn sign_in_redirect(routes: &RouteConfig, original_path: &str, error: Option<&str>) -> Response {
    redirect_with_return(&routes.sign_in_path, original_path, error)
}

fn redirect_with_return(target: &str, original_path: &str, error: Option<&str>) -> Response {
    let location = match error {
        Some(code) => format!("{target}?error={code}&redirect={original_path}"),
        None => format!("{target}?redirect={original_path}"),
    };
    Redirect::to(&location).into_response()
}

/// Appends removal `Set-Cookie` headers for the session cookie and
/// every request cookie matching the auth naming convention.
fn append_cookie_removals(response: &mut Response, parts: &Parts, cookies: &CookieConfig) {
    let mut names = vec![cookies.name.clone()];

    if let Some(raw) = parts.headers.get(COOKIE).and_then(|h| h.to_str().ok()) {
        for pair in raw.split(';') {
            if let Some((name, _)) = pair.trim().split_once('=') {
                let name = name.trim();
                if name.starts_with(&cookies.clear_prefix) && name != cookies.name {
                    names.push(name.to_string());
                }
            }
        }
    }

    for name in names {
        if let Ok(value) = cookies.removal_cookie(&name).parse() {
            response.headers_mut().append(SET_COOKIE, value);
        }
    }
}

// =============================================================================
// Current Tenant Extractor
// =============================================================================

/// Axum extractor for the tenant context the gatekeeper attached.
///
/// Handlers behind the gatekeeper can take this directly:
///
/// ```ignore
/// async fn handler(CurrentTenant(ctx): CurrentTenant) -> String {
///     ctx.tenant_id
/// }
/// ```
pub struct CurrentTenant(pub TenantContext);

impl<S> FromRequestParts<S> for CurrentTenant
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<TenantContext>()
            .cloned()
            .map(CurrentTenant)
            .ok_or_else(|| AuthError::unauthorized("no tenant context attached"))
    }
}

/// Axum extractor for the raw bearer token the gatekeeper attached.
///
/// Needed by handlers that construct a tenant-scoped data client, which
/// forwards the token to the row-level-security layer.
pub struct CurrentToken(pub BearerToken);

impl<S> FromRequestParts<S> for CurrentToken
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<BearerToken>()
            .cloned()
            .map(CurrentToken)
            .ok_or_else(|| AuthError::unauthorized("no credential attached"))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::ValidatedClaims;
    use axum::http::{StatusCode, header};
    use axum::routing::get;
    use axum::{Router, middleware};
    use base64::Engine as _;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use std::collections::HashMap;
    use time::OffsetDateTime;
    use tower::ServiceExt;

    fn test_state() -> AuthState {
        let mut config = AuthConfig::default();
        config.cookie.secure = false;
        AuthState::from_config(config, KeySetCacheConfig::default()).unwrap()
    }

    fn test_app(state: AuthState) -> Router {
        async fn page(CurrentTenant(ctx): CurrentTenant) -> String {
            ctx.tenant_id
        }
        async fn api(CurrentTenant(ctx): CurrentTenant) -> String {
            ctx.tenant_id
        }
        async fn health() -> &'static str {
            "ok"
        }

        Router::new()
            .route("/dashboard/inventory", get(page))
            .route("/api/inventory", get(api))
            .route("/health", get(health))
            .layer(middleware::from_fn_with_state(state, gatekeeper))
    }

    fn claims_for_tenant(tenant: Option<&str>) -> Arc<ValidatedClaims> {
        let exp = (OffsetDateTime::now_utc() + std::time::Duration::from_secs(3600))
            .unix_timestamp();
        Arc::new(ValidatedClaims {
            iss: "https://id.localhost".to_string(),
            sub: "user-1".to_string(),
            aud: vec!["tessera".to_string()],
            exp,
            iat: exp - 3600,
            org_id: tenant.map(String::from),
            team_id: None,
            tenant_id: None,
            roles: vec!["member".to_string()],
            permissions: vec!["inventory:read".to_string()],
            extra: HashMap::new(),
        })
    }

    async fn seed_cache(state: &AuthState, raw_token: &str, tenant: Option<&str>) {
        let token = BearerToken::new(raw_token);
        state
            .cache
            .put(token.fingerprint(), claims_for_tenant(tenant))
            .await;
    }

    fn request(uri: &str, headers: &[(&str, &str)]) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_route_classification() {
        let routes = RouteConfig::default();
        assert_eq!(classify_route("/health", &routes), RouteClass::Public);
        assert_eq!(classify_route("/sign-in", &routes), RouteClass::Public);
        assert_eq!(classify_route("/api/inventory", &routes), RouteClass::Api);
        assert_eq!(classify_route("/dashboard", &routes), RouteClass::Page);
    }

    #[tokio::test]
    async fn test_public_route_without_token() {
        let app = test_app(test_state());
        let response = app.oneshot(request("/health", &[])).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_protected_page_redirects_preserving_path() {
        let app = test_app(test_state());
        let response = app
            .oneshot(request("/dashboard/inventory", &[]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let location = response.headers()[header::LOCATION].to_str().unwrap();
        assert_eq!(location, "/sign-in?redirect=/dashboard/inventory");
    }

    #[tokio::test]
    async fn test_protected_api_rejects_with_401() {
        let app = test_app(test_state());
        let response = app.oneshot(request("/api/inventory", &[])).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
    }

    #[tokio::test]
    async fn test_cached_token_proceeds_with_context() {
        let state = test_state();
        seed_cache(&state, "known-token", Some("acme")).await;

        let app = test_app(state);
        let response = app
            .oneshot(request(
                "/api/inventory",
                &[("authorization", "Bearer known-token")],
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"acme");
    }

    #[tokio::test]
    async fn test_tenant_missing_redirects_page_to_selection() {
        let state = test_state();
        seed_cache(&state, "tenantless-token", None).await;

        let app = test_app(state);
        let response = app
            .oneshot(request(
                "/dashboard/inventory",
                &[("authorization", "Bearer tenantless-token")],
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let location = response.headers()[header::LOCATION].to_str().unwrap();
        assert!(location.starts_with("/select-tenant?"));
        assert!(location.contains("redirect=/dashboard/inventory"));
    }

    #[tokio::test]
    async fn test_tenant_missing_is_400_for_api() {
        let state = test_state();
        seed_cache(&state, "tenantless-token", None).await;

        let app = test_app(state.clone());
        let response = app
            .oneshot(request(
                "/api/inventory",
                &[("authorization", "Bearer tenantless-token")],
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        // Recorded for pattern detection.
        assert_eq!(state.monitor.len().await, 1);
    }

    #[tokio::test]
    async fn test_corrupted_cookie_clears_and_redirects() {
        let state = test_state();
        let app = test_app(state.clone());

        let response = app
            .oneshot(request(
                "/dashboard/inventory",
                &[("cookie", "tessera_session=not-a-jwt; tessera_refresh=x; other=1")],
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let location = response.headers()[header::LOCATION].to_str().unwrap();
        assert!(location.starts_with("/sign-in?error=session_corrupted"));
        assert!(location.contains("redirect=/dashboard/inventory"));

        let removals: Vec<_> = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert!(removals.iter().any(|c| c.starts_with("tessera_session=;")));
        assert!(removals.iter().any(|c| c.starts_with("tessera_refresh=;")));
        // Unrelated cookies stay untouched.
        assert!(!removals.iter().any(|c| c.starts_with("other=")));

        let recent = state.monitor.recent(10).await;
        assert_eq!(recent.len(), 1);
        assert!(recent[0].corruption_signature);
    }

    #[tokio::test]
    async fn test_corruption_recovery_is_idempotent() {
        let state = test_state();

        for _ in 0..2 {
            let app = test_app(state.clone());
            let response = app
                .oneshot(request(
                    "/dashboard/inventory",
                    &[("cookie", "tessera_session=not-a-jwt")],
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::SEE_OTHER);
        }
    }

    #[tokio::test]
    async fn test_malformed_header_token_on_api_is_401() {
        let state = test_state();
        let app = test_app(state.clone());

        let response = app
            .oneshot(request(
                "/api/inventory",
                &[("authorization", "Bearer not-a-jwt")],
            ))
            .await
            .unwrap();

        // Header-sourced malformed tokens are not the corruption
        // signature: no cookie clearing, plain rejection.
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(!response.headers().contains_key(header::SET_COOKIE));
    }

    #[tokio::test]
    async fn test_invalid_token_on_public_route_still_allows() {
        let state = test_state();
        let app = test_app(state.clone());

        let response = app
            .oneshot(request("/health", &[("authorization", "Bearer not-a-jwt")]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        // Still recorded for pattern detection.
        assert_eq!(state.monitor.len().await, 1);
    }

    #[tokio::test]
    async fn test_unreachable_key_service_is_503_for_api() {
        let mut config = AuthConfig::default();
        config.provider.jwks_url = "https://id.invalid/.well-known/jwks.json".to_string();
        config.retry.max_attempts = 1;
        let state = AuthState::from_config(config, KeySetCacheConfig::default()).unwrap();
        let app = test_app(state);

        // Structurally valid header with a kid, forcing a key fetch.
        let header_b64 = URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256","typ":"JWT","kid":"k1"}"#);
        let token = format!("{header_b64}.e30.sig");

        let response = app
            .oneshot(request(
                "/api/inventory",
                &[("authorization", &format!("Bearer {token}"))],
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_failed_validation_never_attaches_context() {
        let state = test_state();
        let app = test_app(state);

        // CurrentTenant rejects with 401 when no context was attached,
        // so a 200 here would mean a partially-valid context leaked
        // through. The malformed token must short-circuit first.
        let response = app
            .oneshot(request(
                "/api/inventory",
                &[("authorization", "Bearer broken.token")],
            ))
            .await
            .unwrap();
        assert_ne!(response.status(), StatusCode::OK);
    }
}

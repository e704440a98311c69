//! Router assembly and serving.

use axum::{Router, middleware, routing::get};
use tower_http::trace::TraceLayer;

use tessera_auth::middleware::gatekeeper;

use crate::routes;
use crate::state::AppState;

/// Builds the application router with the gatekeeper layered over every
/// route.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/sign-in", get(routes::sign_in_page))
        .route("/select-tenant", get(routes::select_tenant_page))
        .route("/error", get(routes::error_page))
        .route("/sign-out", get(routes::sign_out))
        .route("/api/session", get(routes::session))
        .route("/api/inventory", get(routes::inventory))
        .route("/api/admin/auth-health", get(routes::auth_health))
        .layer(middleware::from_fn_with_state(
            state.auth.clone(),
            gatekeeper,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves the router until ctrl-c.
///
/// # Errors
///
/// Returns an error when the listener cannot bind or the server fails.
pub async fn serve(router: Router, host: &str, port: u16) -> anyhow::Result<()> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install shutdown handler");
    } else {
        tracing::info!("Shutdown signal received");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use std::sync::Arc;
    use tessera_auth::jwks::KeySetCacheConfig;
    use tessera_auth::middleware::AuthState;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let mut config = ServerConfig::default();
        config.auth.cookie.secure = false;
        config.database.anon_key = "anon".to_string();

        AppState {
            auth: AuthState::from_config(config.auth, KeySetCacheConfig::default()).unwrap(),
            data: Arc::new(config.database.to_data_api_config().unwrap()),
        }
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let app = build_router(test_state());
        let response = app.oneshot(get_request("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_sign_in_page_is_public() {
        let app = build_router(test_state());
        let response = app.oneshot(get_request("/sign-in")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_api_session_requires_auth() {
        let app = build_router(test_state());
        let response = app.oneshot(get_request("/api/session")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_sign_out_without_session_redirects_to_sign_in() {
        let app = build_router(test_state());
        let response = app.oneshot(get_request("/sign-out")).await.unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let location = response.headers()[header::LOCATION].to_str().unwrap();
        assert!(location.starts_with("/sign-in"));
    }
}

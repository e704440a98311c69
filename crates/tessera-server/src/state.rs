//! Shared application state.

use std::sync::Arc;

use axum::extract::FromRef;

use tessera_auth::middleware::AuthState;
use tessera_db::DataApiConfig;

/// State shared by every route handler.
#[derive(Clone)]
pub struct AppState {
    /// Authentication bridge state.
    pub auth: AuthState,

    /// Data API settings for per-request tenant client construction.
    pub data: Arc<DataApiConfig>,
}

impl FromRef<AppState> for AuthState {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

//! HTTP middleware for the authentication bridge.
//!
//! - [`gatekeeper`] runs the per-request pipeline and failure matrix
//! - [`AuthState`] bundles the components the gatekeeper needs
//! - [`CurrentTenant`] / [`CurrentToken`] extract what the gatekeeper
//!   attached, for handlers behind it
//! - `AuthError: IntoResponse` provides the JSON error matrix for API
//!   callers

pub mod error;
pub mod gatekeeper;

pub use gatekeeper::{
    AuthState, CurrentTenant, CurrentToken, RouteClass, classify_route, gatekeeper,
    resolve_context,
};

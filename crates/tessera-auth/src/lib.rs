//! # tessera-auth
//!
//! Authentication and tenant-context bridge for the Tessera ERP
//! platform.
//!
//! Translates an identity provider's bearer token into a request-scoped,
//! tenant-aware context that the row-level-security-enforcing data layer
//! uses to authorize every query:
//!
//! 1. [`extract`] pulls the credential out of the request
//! 2. [`token`] validates its signature and claims against the
//!    provider's published keys ([`jwks`])
//! 3. [`claims`] transforms validated claims into a [`claims::TenantContext`]
//! 4. [`cache`] short-circuits repeat validations within a burst
//! 5. [`middleware`] orchestrates all of it per request and owns the
//!    failure matrix
//! 6. [`monitor`] watches for repeating failure patterns
//!
//! ## Modules
//!
//! - [`config`] - Bridge configuration
//! - [`error`] - Error taxonomy
//! - [`extract`] - Bearer credential extraction
//! - [`jwks`] - Signing key-set fetching and caching
//! - [`token`] - Token validation
//! - [`claims`] - Validated claims and tenant context
//! - [`cache`] - Validated-claims cache
//! - [`monitor`] - Failure monitor
//! - [`provider`] - Identity provider boundary (userinfo)
//! - [`middleware`] - Request gatekeeper and extractors

pub mod cache;
pub mod claims;
pub mod config;
pub mod error;
pub mod extract;
pub mod jwks;
pub mod middleware;
pub mod monitor;
pub mod provider;
pub mod token;

pub use cache::ContextCache;
pub use claims::{TenantContext, TenantSource, ValidatedClaims, transform};
pub use config::AuthConfig;
pub use error::{AuthError, FailureKind};
pub use extract::{BearerToken, TokenSource, extract_token};
pub use jwks::{KeySetCache, KeySetCacheConfig, KeySetError};
pub use middleware::{AuthState, CurrentTenant, CurrentToken, gatekeeper, resolve_context};
pub use monitor::{AuthMonitor, FailureRecord};
pub use provider::{IdentityProvider, UserProfile};
pub use token::{TokenValidator, ValidationFailure};

/// Type alias for authentication results.
pub type AuthResult<T> = Result<T, AuthError>;

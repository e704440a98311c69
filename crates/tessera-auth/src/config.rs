//! Authentication bridge configuration.
//!
//! Configuration for every part of the bridge: the identity provider
//! boundary, session cookies, the context cache, retry policy for the
//! key set fetch, failure-monitor thresholds, and route classification.
//!
//! # Example (TOML)
//!
//! ```toml
//! [auth.provider]
//! issuer = "https://id.example.com"
//! audience = "tessera-erp"
//! jwks_url = "https://id.example.com/.well-known/jwks.json"
//!
//! [auth.cache]
//! ttl = "5m"
//!
//! [auth.tenant]
//! default_tenant = "acme"
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the authentication bridge.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Identity provider boundary settings.
    pub provider: ProviderConfig,

    /// Session cookie settings.
    pub cookie: CookieConfig,

    /// Context cache settings.
    pub cache: ContextCacheConfig,

    /// Retry policy for transient key-set fetch failures.
    pub retry: RetryConfig,

    /// Tenant resolution settings.
    pub tenant: TenantConfig,

    /// Failure monitor thresholds.
    pub monitor: MonitorConfig,

    /// Route classification.
    pub routes: RouteConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            cookie: CookieConfig::default(),
            cache: ContextCacheConfig::default(),
            retry: RetryConfig::default(),
            tenant: TenantConfig::default(),
            monitor: MonitorConfig::default(),
            routes: RouteConfig::default(),
        }
    }
}

/// Identity provider boundary settings.
///
/// The provider issues the bearer tokens this bridge validates. Token
/// issuance and session refresh are the provider's concern; only the
/// published key set and the optional userinfo endpoint are consumed.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Expected `iss` claim value.
    pub issuer: String,

    /// Expected `aud` claim value (this application's registered id).
    pub audience: String,

    /// The provider's published signing key set endpoint.
    pub jwks_url: String,

    /// Optional userinfo endpoint for enriched profile data.
    pub userinfo_url: Option<String>,

    /// Clock skew tolerance for token validation.
    #[serde(with = "humantime_serde")]
    pub clock_skew_tolerance: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            issuer: "https://id.localhost".to_string(),
            audience: "tessera".to_string(),
            jwks_url: "https://id.localhost/.well-known/jwks.json".to_string(),
            userinfo_url: None,
            clock_skew_tolerance: Duration::from_secs(60),
        }
    }
}

/// Session cookie settings for browser-based auth.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CookieConfig {
    /// Whether cookie-based token extraction is enabled.
    pub enabled: bool,

    /// Name of the session cookie carrying the bearer token.
    pub name: String,

    /// Prefix identifying auth-related cookies. Every cookie whose name
    /// starts with this prefix is deleted on the corruption recovery path.
    pub clear_prefix: String,

    /// Send cookies only over HTTPS.
    pub secure: bool,

    /// Cookie path attribute.
    pub path: String,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            name: "tessera_session".to_string(),
            clear_prefix: "tessera_".to_string(),
            secure: true,
            path: "/".to_string(),
        }
    }
}

impl CookieConfig {
    /// Builds a removal cookie (expired, empty value) for the given name.
    #[must_use]
    pub fn removal_cookie(&self, name: &str) -> String {
        let mut parts = format!("{name}=; Max-Age=0; Path={}", self.path);
        if self.secure {
            parts.push_str("; Secure");
        }
        parts.push_str("; HttpOnly");
        parts
    }
}

/// Context cache settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ContextCacheConfig {
    /// Configured entry lifetime. The effective lifetime of an entry is
    /// the minimum of this value and the token's remaining validity.
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
}

impl Default for ContextCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300), // 5 minutes
        }
    }
}

/// Bounded retry policy for transient key-set fetch failures.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,

    /// Delay before the first retry; doubles per attempt.
    #[serde(with = "humantime_serde")]
    pub initial_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
        }
    }
}

/// Tenant resolution settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TenantConfig {
    /// Tenant granted when claims carry no tenant identifier at all.
    ///
    /// Unset means there is no fallback: a token without a tenant claim
    /// routes to tenant selection instead. When set, every use of the
    /// fallback is logged and the resulting context is flagged as
    /// fallback-sourced.
    pub default_tenant: Option<String>,
}

/// Failure monitor thresholds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Ring buffer capacity.
    pub capacity: usize,

    /// Number of same-kind failures within the window that constitutes
    /// a repeating pattern.
    pub pattern_threshold: usize,

    /// Sliding window for pattern detection.
    #[serde(with = "humantime_serde")]
    pub pattern_window: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            capacity: 256,
            pattern_threshold: 5,
            pattern_window: Duration::from_secs(60),
        }
    }
}

/// Route classification for the gatekeeper.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RouteConfig {
    /// Path prefixes reachable without a credential.
    pub public_prefixes: Vec<String>,

    /// Path prefixes answered with JSON errors instead of redirects.
    pub api_prefixes: Vec<String>,

    /// Path prefixes allowed to supply the token as a query parameter.
    /// Everything else must use the header or the cookie.
    pub query_token_prefixes: Vec<String>,

    /// Sign-in page location for unauthenticated browser navigations.
    pub sign_in_path: String,

    /// Tenant selection page for authenticated users without a tenant.
    pub tenant_select_path: String,

    /// Generic error page for unexpected failures on browser navigations.
    pub error_path: String,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            public_prefixes: vec![
                "/health".to_string(),
                "/sign-in".to_string(),
                "/select-tenant".to_string(),
                "/error".to_string(),
            ],
            api_prefixes: vec!["/api/".to_string()],
            query_token_prefixes: vec![],
            sign_in_path: "/sign-in".to_string(),
            tenant_select_path: "/select-tenant".to_string(),
            error_path: "/error".to_string(),
        }
    }
}

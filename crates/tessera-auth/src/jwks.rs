//! Signing key-set fetching and caching.
//!
//! The identity provider publishes its token signing keys at a
//! well-known endpoint. This module fetches that key set over HTTPS and
//! caches it with its own TTL, independent of token caching: the TTL
//! honors `Cache-Control: max-age` from the provider, clamped to
//! configurable bounds.
//!
//! Transient fetch failures are retried a bounded number of times with
//! doubling backoff before surfacing as a hard failure. A dropped
//! request abandons any in-flight fetch without leaving partial state:
//! the cache is only written after a fully parsed response.
//!
//! # Security Considerations
//!
//! - Only HTTPS endpoints are allowed (configurable for testing)
//! - HTTP timeouts prevent hanging on slow endpoints
//! - Response size is limited
//! - TTL is bounded to prevent cache poisoning via malicious Cache-Control

use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::jwk::{Jwk, JwkSet, PublicKeyUse};
use jsonwebtoken::{Algorithm, DecodingKey};
use tokio::sync::RwLock;
use url::Url;

use crate::config::RetryConfig;

/// Configuration for the signing key-set cache.
#[derive(Debug, Clone)]
pub struct KeySetCacheConfig {
    /// Default TTL when Cache-Control is absent (default: 1 hour).
    pub default_ttl: Duration,

    /// Maximum TTL regardless of Cache-Control (default: 24 hours).
    pub max_ttl: Duration,

    /// Minimum TTL regardless of Cache-Control (default: 5 minutes).
    pub min_ttl: Duration,

    /// HTTP request timeout (default: 10 seconds).
    pub request_timeout: Duration,

    /// Maximum response size in bytes (default: 1 MB).
    pub max_response_size: usize,

    /// Whether to allow HTTP (non-HTTPS) endpoints. Testing only.
    pub allow_http: bool,
}

impl Default for KeySetCacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(3600),
            max_ttl: Duration::from_secs(86400),
            min_ttl: Duration::from_secs(300),
            request_timeout: Duration::from_secs(10),
            max_response_size: 1024 * 1024,
            allow_http: false,
        }
    }
}

impl KeySetCacheConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default TTL (used when Cache-Control is absent).
    #[must_use]
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Sets the HTTP request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Allows HTTP (non-HTTPS) endpoints.
    ///
    /// # Warning
    ///
    /// Testing only. Production key sets must be served over HTTPS.
    #[must_use]
    pub fn with_allow_http(mut self, allow: bool) -> Self {
        self.allow_http = allow;
        self
    }
}

/// Errors that can occur fetching or consulting the key set.
#[derive(Debug, thiserror::Error)]
pub enum KeySetError {
    /// A network error occurred while fetching the key set.
    #[error("Network error: {0}")]
    Network(String),

    /// The endpoint returned a non-success status code.
    #[error("HTTP error: status {0}")]
    Http(u16),

    /// The response could not be parsed as a key set.
    #[error("Failed to parse key set: {0}")]
    Parse(String),

    /// The requested key id is not in the key set.
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// A key could not be converted to a decoding key.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// The endpoint scheme is not allowed (must be HTTPS in production).
    #[error("Invalid URL scheme: only HTTPS is allowed")]
    InvalidScheme,

    /// The response exceeded the maximum allowed size.
    #[error("Response exceeds maximum size of {max_size} bytes")]
    ResponseTooLarge {
        /// The maximum allowed size.
        max_size: usize,
    },
}

impl KeySetError {
    /// Returns `true` if retrying the fetch could succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Http(status) => *status >= 500,
            _ => false,
        }
    }
}

struct CachedKeySet {
    keys: JwkSet,
    expires_at: Instant,
}

/// Cache of the identity provider's signing key set.
///
/// Holds the most recently fetched key set until its TTL elapses, and
/// refreshes on demand when a lookup misses.
pub struct KeySetCache {
    endpoint: Url,
    http_client: reqwest::Client,
    cached: Arc<RwLock<Option<CachedKeySet>>>,
    config: KeySetCacheConfig,
    retry: RetryConfig,
}

impl KeySetCache {
    /// Creates a cache for the given key-set endpoint.
    ///
    /// # Errors
    ///
    /// Returns `KeySetError::InvalidScheme` when the endpoint is not
    /// HTTPS and HTTP is not explicitly allowed, or `Network` when the
    /// HTTP client cannot be constructed.
    pub fn new(
        endpoint: Url,
        config: KeySetCacheConfig,
        retry: RetryConfig,
    ) -> Result<Self, KeySetError> {
        validate_scheme(&endpoint, config.allow_http)?;

        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| KeySetError::Network(e.to_string()))?;

        Ok(Self {
            endpoint,
            http_client,
            cached: Arc::new(RwLock::new(None)),
            config,
            retry,
        })
    }

    /// Gets a decoding key by key id.
    ///
    /// Checks the cache first; on miss or expiry, fetches a fresh key
    /// set (with bounded retry) and looks again.
    ///
    /// # Errors
    ///
    /// Returns `KeyNotFound` when the id is absent even after a fresh
    /// fetch, or a fetch error when the endpoint is unreachable.
    pub async fn get_key(&self, kid: &str) -> Result<(DecodingKey, Option<Algorithm>), KeySetError> {
        if let Some(found) = self.lookup(kid).await {
            tracing::trace!(kid = %kid, "Signing key cache hit");
            return found;
        }

        tracing::debug!(kid = %kid, "Signing key cache miss, refreshing key set");
        self.refresh().await?;

        self.lookup(kid)
            .await
            .unwrap_or_else(|| Err(KeySetError::KeyNotFound(kid.to_string())))
    }

    /// Looks up a key in the cache without fetching.
    ///
    /// Outer `None` means cache miss; inner `Result` reports a key that
    /// is present but unusable.
    async fn lookup(&self, kid: &str) -> Option<Result<(DecodingKey, Option<Algorithm>), KeySetError>> {
        let cached = self.cached.read().await;
        let entry = cached.as_ref()?;

        if Instant::now() >= entry.expires_at {
            return None;
        }

        let jwk = entry
            .keys
            .keys
            .iter()
            .filter(|k| !matches!(&k.common.public_key_use, Some(PublicKeyUse::Encryption)))
            .find(|k| k.common.key_id.as_deref() == Some(kid))?;

        Some(
            DecodingKey::from_jwk(jwk)
                .map(|dk| (dk, jwk_algorithm(jwk)))
                .map_err(|e| KeySetError::InvalidKey(e.to_string())),
        )
    }

    /// Fetches the key set and replaces the cached copy.
    ///
    /// Transient failures (network errors, 5xx responses) are retried up
    /// to the configured number of attempts with doubling backoff.
    pub async fn refresh(&self) -> Result<(), KeySetError> {
        let mut backoff = self.retry.initial_backoff;
        let mut attempt = 1;

        loop {
            match self.fetch_once().await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    tracing::warn!(
                        attempt = attempt,
                        error = %e,
                        backoff_ms = backoff.as_millis() as u64,
                        "Key set fetch failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_once(&self) -> Result<(), KeySetError> {
        let response = self
            .http_client
            .get(self.endpoint.as_str())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| KeySetError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(KeySetError::Http(response.status().as_u16()));
        }

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_response_size
        {
            return Err(KeySetError::ResponseTooLarge {
                max_size: self.config.max_response_size,
            });
        }

        let ttl = self.parse_cache_control(response.headers());

        let keys: JwkSet = response
            .json()
            .await
            .map_err(|e| KeySetError::Parse(e.to_string()))?;

        tracing::debug!(
            endpoint = %self.endpoint,
            key_count = keys.keys.len(),
            ttl_secs = ttl.as_secs(),
            "Cached signing key set"
        );

        let mut cached = self.cached.write().await;
        *cached = Some(CachedKeySet {
            keys,
            expires_at: Instant::now() + ttl,
        });

        Ok(())
    }

    /// Parses Cache-Control to determine the TTL.
    ///
    /// Extracts `max-age` and clamps it between `min_ttl` and `max_ttl`;
    /// falls back to `default_ttl` when absent or unparsable.
    fn parse_cache_control(&self, headers: &reqwest::header::HeaderMap) -> Duration {
        let ttl = headers
            .get(reqwest::header::CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| {
                v.split(',').find_map(|directive| {
                    directive
                        .trim()
                        .strip_prefix("max-age=")
                        .and_then(|s| s.parse::<u64>().ok())
                })
            })
            .map(Duration::from_secs)
            .unwrap_or(self.config.default_ttl);

        ttl.min(self.config.max_ttl).max(self.config.min_ttl)
    }

    /// Drops the cached key set, forcing a fetch on the next lookup.
    pub async fn invalidate(&self) {
        let mut cached = self.cached.write().await;
        *cached = None;
        tracing::debug!(endpoint = %self.endpoint, "Invalidated signing key cache");
    }

    /// Returns `true` if a non-expired key set is cached.
    pub async fn is_fresh(&self) -> bool {
        let cached = self.cached.read().await;
        cached
            .as_ref()
            .is_some_and(|entry| Instant::now() < entry.expires_at)
    }
}

fn validate_scheme(endpoint: &Url, allow_http: bool) -> Result<(), KeySetError> {
    match endpoint.scheme() {
        "https" => Ok(()),
        "http" if allow_http => Ok(()),
        _ => Err(KeySetError::InvalidScheme),
    }
}

/// Extracts the declared algorithm from a JWK, if any.
fn jwk_algorithm(jwk: &Jwk) -> Option<Algorithm> {
    use jsonwebtoken::jwk::KeyAlgorithm;

    jwk.common.key_algorithm.as_ref().and_then(|alg| match alg {
        KeyAlgorithm::RS256 => Some(Algorithm::RS256),
        KeyAlgorithm::RS384 => Some(Algorithm::RS384),
        KeyAlgorithm::RS512 => Some(Algorithm::RS512),
        KeyAlgorithm::ES256 => Some(Algorithm::ES256),
        KeyAlgorithm::ES384 => Some(Algorithm::ES384),
        KeyAlgorithm::PS256 => Some(Algorithm::PS256),
        KeyAlgorithm::PS384 => Some(Algorithm::PS384),
        KeyAlgorithm::PS512 => Some(Algorithm::PS512),
        KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
        _ => None,
    })
}

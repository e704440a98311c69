//! Bearer credential extraction.
//!
//! Pulls an opaque bearer token out of an inbound request's parts.
//! Precedence: `Authorization: Bearer` header, then the configured
//! session cookie, then an `access_token` query parameter on explicitly
//! allow-listed route prefixes. Absence of a token is a normal outcome,
//! not an error.

use std::fmt;

use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use sha2::{Digest, Sha256};

use crate::config::{CookieConfig, RouteConfig};

/// Query parameter name accepted on allow-listed routes.
const QUERY_TOKEN_PARAM: &str = "access_token";

/// An opaque bearer credential extracted from a request.
///
/// The raw value never appears in `Debug` or `Display` output; use
/// [`BearerToken::fingerprint`] wherever an identifier is needed in logs
/// or as a cache key.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    /// Wraps a raw credential string.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The raw credential, for forwarding to the validator or a
    /// downstream client. Never log this.
    #[must_use]
    pub fn reveal(&self) -> &str {
        &self.0
    }

    /// Stable one-way hash of the credential, safe to log and to use as
    /// a cache key.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        hex::encode(digest)
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BearerToken(fp={})", &self.fingerprint()[..12])
    }
}

/// Where the credential was found in the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    /// `Authorization: Bearer` header.
    Header,
    /// Session cookie.
    Cookie,
    /// Allow-listed query parameter.
    Query,
}

/// Extracts a bearer token from request parts.
///
/// Pure function of the request data; returns `None` when no credential
/// is present.
#[must_use]
pub fn extract_token(
    parts: &Parts,
    cookies: &CookieConfig,
    routes: &RouteConfig,
) -> Option<(BearerToken, TokenSource)> {
    if let Some(token) = token_from_header(parts) {
        return Some((token, TokenSource::Header));
    }

    if cookies.enabled
        && let Some(token) = token_from_cookie(parts, &cookies.name)
    {
        return Some((token, TokenSource::Cookie));
    }

    if query_tokens_allowed(parts.uri.path(), routes)
        && let Some(token) = token_from_query(parts)
    {
        return Some((token, TokenSource::Query));
    }

    None
}

fn token_from_header(parts: &Parts) -> Option<BearerToken> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(BearerToken::new)
}

fn token_from_cookie(parts: &Parts, cookie_name: &str) -> Option<BearerToken> {
    let cookie_header = parts.headers.get(COOKIE)?.to_str().ok()?;

    for pair in cookie_header.split(';') {
        if let Some((name, value)) = pair.trim().split_once('=')
            && name.trim() == cookie_name
        {
            let value = value.trim();
            if !value.is_empty() {
                return Some(BearerToken::new(value));
            }
        }
    }

    None
}

fn token_from_query(parts: &Parts) -> Option<BearerToken> {
    let query = parts.uri.query()?;

    for pair in query.split('&') {
        if let Some((key, value)) = pair.split_once('=')
            && key == QUERY_TOKEN_PARAM
        {
            let value = value.trim();
            if !value.is_empty() {
                return Some(BearerToken::new(value));
            }
        }
    }

    None
}

fn query_tokens_allowed(path: &str, routes: &RouteConfig) -> bool {
    routes
        .query_token_prefixes
        .iter()
        .any(|prefix| path.starts_with(prefix.as_str()))
}

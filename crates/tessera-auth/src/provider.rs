//! Identity provider boundary.
//!
//! Token issuance and session refresh belong to the provider and are a
//! black box here. The one call this bridge makes beyond the key set
//! fetch is the optional userinfo lookup: enriched profile data for a
//! user whose token has already been validated.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

use crate::error::AuthError;
use crate::extract::BearerToken;

/// Enriched user profile returned by the provider's userinfo endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    /// Subject identifier.
    pub sub: String,

    /// Display name.
    pub name: Option<String>,

    /// Email address.
    pub email: Option<String>,

    /// Profile image URL.
    pub picture: Option<String>,

    /// Team memberships, when the provider exposes them.
    #[serde(default)]
    pub teams: Vec<String>,

    /// Any additional fields the provider included.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Client for the provider's userinfo endpoint.
#[derive(Debug)]
pub struct IdentityProvider {
    http_client: reqwest::Client,
    userinfo_url: Option<Url>,
}

impl IdentityProvider {
    /// Creates a provider boundary client.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` when the userinfo URL is
    /// unparsable, or `Internal` when the HTTP client cannot be built.
    pub fn new(userinfo_url: Option<&str>, request_timeout: Duration) -> Result<Self, AuthError> {
        let userinfo_url = userinfo_url
            .map(Url::parse)
            .transpose()
            .map_err(|e| AuthError::configuration(format!("invalid userinfo URL: {e}")))?;

        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| AuthError::internal(e.to_string()))?;

        Ok(Self {
            http_client,
            userinfo_url,
        })
    }

    /// Returns `true` if a userinfo endpoint is configured.
    #[must_use]
    pub fn supports_userinfo(&self) -> bool {
        self.userinfo_url.is_some()
    }

    /// Fetches the enriched profile for an already-validated token.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` when no endpoint is configured,
    /// `ServiceUnavailable` on network failure, `Unauthorized` when the
    /// provider rejects the token.
    pub async fn fetch_userinfo(&self, token: &BearerToken) -> Result<UserProfile, AuthError> {
        let url = self
            .userinfo_url
            .as_ref()
            .ok_or_else(|| AuthError::configuration("no userinfo endpoint configured"))?;

        let response = self
            .http_client
            .get(url.as_str())
            .bearer_auth(token.reveal())
            .send()
            .await
            .map_err(|e| AuthError::service_unavailable(format!("userinfo fetch failed: {e}")))?;

        if response.status().as_u16() == 401 {
            return Err(AuthError::unauthorized("provider rejected token"));
        }

        if !response.status().is_success() {
            return Err(AuthError::service_unavailable(format!(
                "userinfo returned HTTP {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::internal(format!("unparsable userinfo response: {e}")))
    }
}

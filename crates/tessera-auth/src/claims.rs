//! Validated claims and the canonical tenant context.
//!
//! [`ValidatedClaims`] is the structured result of successful token
//! validation; it is only produced by the validator, never hand-built
//! from untrusted input. [`transform`] maps it into the transport
//! agnostic [`TenantContext`] the data layer consumes.
//!
//! The provider has been observed emitting the tenant identifier under
//! more than one claim name. Resolution checks the known aliases in a
//! fixed priority order: `org_id`, then `team_id`, then `tenant_id`.
//! When none is present, a configured default tenant may be substituted;
//! that substitution is explicit (flagged on the context) and logged.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Deserializer, Serialize};

use crate::config::TenantConfig;
use crate::error::AuthError;

/// Claims extracted from a cryptographically validated token.
///
/// Field layout mirrors the provider's token payload; tenant aliases are
/// kept separate here and only reconciled by [`transform`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedClaims {
    /// Issuer identifier.
    pub iss: String,

    /// Subject identifier (user id).
    pub sub: String,

    /// Audience (string or array on the wire).
    #[serde(deserialize_with = "deserialize_audience")]
    pub aud: Vec<String>,

    /// Expiration time (Unix timestamp).
    pub exp: i64,

    /// Issued at time (Unix timestamp).
    pub iat: i64,

    /// Tenant identifier under the primary alias.
    #[serde(default)]
    pub org_id: Option<String>,

    /// Tenant identifier under the legacy alias.
    #[serde(default)]
    pub team_id: Option<String>,

    /// Tenant identifier under the canonical alias.
    #[serde(default)]
    pub tenant_id: Option<String>,

    /// Role names in issuance order.
    #[serde(default)]
    pub roles: Vec<String>,

    /// Permission strings.
    #[serde(default)]
    pub permissions: Vec<String>,

    /// Any additional claims the provider included.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl ValidatedClaims {
    /// Resolves the tenant identifier from the known aliases, in
    /// priority order. Empty strings count as absent.
    #[must_use]
    pub fn tenant_claim(&self) -> Option<&str> {
        [&self.org_id, &self.team_id, &self.tenant_id]
            .into_iter()
            .filter_map(|alias| alias.as_deref())
            .map(str::trim)
            .find(|v| !v.is_empty())
    }
}

/// How the context's tenant identifier was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantSource {
    /// Carried in the token claims.
    Claim,
    /// Substituted from the configured default tenant.
    Fallback,
}

/// Canonical, request-scoped tenant context.
///
/// Owned by a single request's processing path. `tenant_id` is never
/// empty: a token without a resolvable tenant short-circuits before a
/// context exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantContext {
    /// Authenticated user id (token subject).
    pub user_id: String,

    /// Resolved tenant id.
    pub tenant_id: String,

    /// Role names in issuance order.
    pub roles: Vec<String>,

    /// Permission strings.
    pub permissions: HashSet<String>,

    /// Whether the tenant came from a claim or the configured fallback.
    pub tenant_source: TenantSource,
}

impl TenantContext {
    /// Returns `true` if the user has a specific role.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Returns `true` if the context carries a specific permission.
    #[must_use]
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }

    /// Requires a permission, failing with `Forbidden` otherwise.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Forbidden` when the permission is absent.
    pub fn require_permission(&self, permission: &str) -> Result<(), AuthError> {
        if self.has_permission(permission) {
            Ok(())
        } else {
            Err(AuthError::forbidden(format!(
                "missing permission: {permission}"
            )))
        }
    }

    /// Returns `true` if the tenant was substituted from configuration
    /// rather than carried in the token.
    #[must_use]
    pub fn is_fallback_tenant(&self) -> bool {
        self.tenant_source == TenantSource::Fallback
    }
}

/// Maps validated claims into a canonical tenant context.
///
/// Pure function of its inputs. When the claims carry no tenant under
/// any known alias, the configured default tenant is substituted if one
/// is set; the substitution is logged at WARN and flagged on the
/// returned context.
///
/// # Errors
///
/// Returns `AuthError::TenantMissing` when no alias resolves and no
/// default tenant is configured.
pub fn transform(
    claims: &ValidatedClaims,
    tenant_config: &TenantConfig,
) -> Result<TenantContext, AuthError> {
    let (tenant_id, tenant_source) = match claims.tenant_claim() {
        Some(tenant) => (tenant.to_string(), TenantSource::Claim),
        None => match &tenant_config.default_tenant {
            Some(default) if !default.is_empty() => {
                tracing::warn!(
                    user_id = %claims.sub,
                    default_tenant = %default,
                    "No tenant claim present, substituting configured default tenant"
                );
                (default.clone(), TenantSource::Fallback)
            }
            _ => return Err(AuthError::TenantMissing),
        },
    };

    Ok(TenantContext {
        user_id: claims.sub.clone(),
        tenant_id,
        roles: claims.roles.clone(),
        permissions: claims.permissions.iter().cloned().collect(),
        tenant_source,
    })
}

/// Accepts `aud` as either a single string or an array of strings.
fn deserialize_audience<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Audience {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Audience::deserialize(deserializer)? {
        Audience::One(aud) => vec![aud],
        Audience::Many(auds) => auds,
    })
}

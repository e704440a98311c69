//! Authentication error types.
//!
//! This module defines the single error taxonomy for the authentication
//! bridge. Every failure the gatekeeper can observe is one of these
//! variants; the gatekeeper is the only place that translates them into
//! HTTP outcomes.

use std::fmt;

use crate::token::ValidationFailure;

/// Errors that can occur while resolving a request's tenant context.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The request carries no usable credential for a protected route.
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Description of why the request is unauthorized.
        message: String,
    },

    /// The credential was present but failed validation.
    #[error("Token validation failed: {0}")]
    Validation(#[from] ValidationFailure),

    /// The credential is valid but no tenant could be resolved for it.
    #[error("No tenant resolved for authenticated user")]
    TenantMissing,

    /// The authenticated context lacks a required permission.
    #[error("Forbidden: {message}")]
    Forbidden {
        /// Description of the missing permission.
        message: String,
    },

    /// A backing service (key set endpoint, data API) is unreachable.
    #[error("Service unavailable: {message}")]
    ServiceUnavailable {
        /// Description of the outage.
        message: String,
    },

    /// The auth configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `Unauthorized` error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Creates a new `Forbidden` error.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// Creates a new `ServiceUnavailable` error.
    #[must_use]
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::ServiceUnavailable {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this error should be answered with a 401.
    #[must_use]
    pub fn is_authentication_error(&self) -> bool {
        matches!(self, Self::Unauthorized { .. } | Self::Validation(_))
    }

    /// Returns `true` if this is a server-side failure (5xx category).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::ServiceUnavailable { .. } | Self::Configuration { .. } | Self::Internal { .. }
        )
    }

    /// Returns the failure kind used by the monitor, if this error is
    /// worth recording.
    ///
    /// Absence of a credential is a routing decision, not a failure, so
    /// `Unauthorized` maps to `None`. Permission denials are authorization
    /// outcomes and are not recorded either.
    #[must_use]
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Validation(failure) => Some(failure.kind()),
            Self::TenantMissing => Some(FailureKind::TenantMissing),
            Self::ServiceUnavailable { .. } => Some(FailureKind::Service),
            Self::Internal { .. } | Self::Configuration { .. } => Some(FailureKind::Internal),
            Self::Unauthorized { .. } | Self::Forbidden { .. } => None,
        }
    }
}

/// Categories of recorded authentication failures.
///
/// These key the monitor's pattern detection and its static
/// recommendations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Token could not be parsed (wrong segment count, undecodable payload).
    Malformed,
    /// Token expiry has passed.
    Expired,
    /// Signature did not verify against the provider's keys.
    BadSignature,
    /// Token issuer does not match the configured provider.
    IssuerMismatch,
    /// Token audience does not match this application.
    AudienceMismatch,
    /// The signing key referenced by the token is not in the key set.
    UnknownKey,
    /// Valid credential but no resolvable tenant.
    TenantMissing,
    /// Transient failure reaching a backing service.
    Service,
    /// Unexpected internal failure.
    Internal,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => write!(f, "malformed"),
            Self::Expired => write!(f, "expired"),
            Self::BadSignature => write!(f, "bad-signature"),
            Self::IssuerMismatch => write!(f, "issuer-mismatch"),
            Self::AudienceMismatch => write!(f, "audience-mismatch"),
            Self::UnknownKey => write!(f, "unknown-key"),
            Self::TenantMissing => write!(f, "tenant-missing"),
            Self::Service => write!(f, "service"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

//! Bearer token validation.
//!
//! [`TokenValidator`] verifies a token's cryptographic signature against
//! the provider's published signing keys and checks its structural
//! claims (expiry, issuer, audience). Expected failures are returned as
//! tagged [`ValidationFailure`] variants, never panics: the distinction
//! between a malformed credential and a signature or claim failure
//! matters downstream for corruption-pattern detection.
//!
//! Validation is idempotent and side-effect-free apart from the key-set
//! fetch, which is cached with its own TTL in [`crate::jwks`].

use std::sync::Arc;

use jsonwebtoken::{Validation, decode, decode_header};

use crate::claims::ValidatedClaims;
use crate::config::ProviderConfig;
use crate::error::FailureKind;
use crate::extract::BearerToken;
use crate::jwks::{KeySetCache, KeySetError};

/// Tagged validation failures.
///
/// Every expected way a present credential can fail validation. The
/// gatekeeper converts these into HTTP outcomes; the monitor records
/// their [`FailureKind`].
#[derive(Debug, thiserror::Error)]
pub enum ValidationFailure {
    /// The token cannot be parsed (wrong segment count, undecodable
    /// header or payload).
    #[error("Malformed token: {message}")]
    Malformed {
        /// What failed to parse.
        message: String,
    },

    /// The token's expiry has passed.
    #[error("Token expired")]
    Expired,

    /// The signature does not verify against the provider's keys.
    #[error("Signature verification failed")]
    BadSignature,

    /// The `iss` claim does not match the configured provider.
    #[error("Issuer mismatch")]
    IssuerMismatch,

    /// The `aud` claim does not include this application.
    #[error("Audience mismatch")]
    AudienceMismatch,

    /// The key id referenced by the token is not in the provider's
    /// key set.
    #[error("Unknown signing key: {kid}")]
    UnknownKey {
        /// The unrecognized key id.
        kid: String,
    },

    /// The key set could not be fetched after bounded retries.
    #[error("Key service failure: {message}")]
    KeyService {
        /// Description of the fetch failure.
        message: String,
    },
}

impl ValidationFailure {
    /// Creates a new `Malformed` failure.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// The monitor category for this failure.
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Malformed { .. } => FailureKind::Malformed,
            Self::Expired => FailureKind::Expired,
            Self::BadSignature => FailureKind::BadSignature,
            Self::IssuerMismatch => FailureKind::IssuerMismatch,
            Self::AudienceMismatch => FailureKind::AudienceMismatch,
            Self::UnknownKey { .. } => FailureKind::UnknownKey,
            Self::KeyService { .. } => FailureKind::Service,
        }
    }
}

/// Validates bearer tokens against the configured identity provider.
pub struct TokenValidator {
    key_cache: Arc<KeySetCache>,
    issuer: String,
    audience: String,
    leeway_secs: u64,
}

impl TokenValidator {
    /// Creates a validator for the given provider settings.
    #[must_use]
    pub fn new(key_cache: Arc<KeySetCache>, provider: &ProviderConfig) -> Self {
        Self {
            key_cache,
            issuer: provider.issuer.trim_end_matches('/').to_string(),
            audience: provider.audience.clone(),
            leeway_secs: provider.clock_skew_tolerance.as_secs(),
        }
    }

    /// Validates a token's signature and structural claims.
    ///
    /// # Errors
    ///
    /// Returns a tagged [`ValidationFailure`] for every expected failure
    /// case; never panics on untrusted input.
    pub async fn validate(&self, token: &BearerToken) -> Result<ValidatedClaims, ValidationFailure> {
        let raw = token.reveal();

        // Structural pre-check, before touching the key service.
        let segments = raw.split('.').count();
        if segments != 3 {
            return Err(ValidationFailure::malformed(format!(
                "expected 3 segments, found {segments}"
            )));
        }

        let header = decode_header(raw)
            .map_err(|e| ValidationFailure::malformed(format!("undecodable header: {e}")))?;

        let kid = header.kid.ok_or_else(|| ValidationFailure::UnknownKey {
            kid: "(none)".to_string(),
        })?;

        let (decoding_key, key_alg) = self.key_cache.get_key(&kid).await.map_err(|e| match e {
            KeySetError::KeyNotFound(kid) => ValidationFailure::UnknownKey { kid },
            other => ValidationFailure::KeyService {
                message: other.to_string(),
            },
        })?;

        let mut validation = Validation::new(key_alg.unwrap_or(header.alg));
        validation.set_audience(&[&self.audience]);
        validation.set_issuer(&[&self.issuer]);
        validation.leeway = self.leeway_secs;

        let data = decode::<ValidatedClaims>(raw, &decoding_key, &validation)
            .map_err(classify_decode_error)?;

        tracing::debug!(
            subject = %data.claims.sub,
            token = %token.fingerprint(),
            "Token validated"
        );

        Ok(data.claims)
    }
}

/// Maps the JWT library's error kinds onto the failure taxonomy.
fn classify_decode_error(error: jsonwebtoken::errors::Error) -> ValidationFailure {
    use jsonwebtoken::errors::ErrorKind;

    match error.kind() {
        ErrorKind::ExpiredSignature | ErrorKind::ImmatureSignature => ValidationFailure::Expired,
        ErrorKind::InvalidSignature
        | ErrorKind::InvalidAlgorithm
        | ErrorKind::InvalidAlgorithmName => ValidationFailure::BadSignature,
        ErrorKind::InvalidIssuer => ValidationFailure::IssuerMismatch,
        ErrorKind::InvalidAudience => ValidationFailure::AudienceMismatch,
        ErrorKind::MissingRequiredClaim(claim) => match claim.as_str() {
            "iss" => ValidationFailure::IssuerMismatch,
            "aud" => ValidationFailure::AudienceMismatch,
            other => ValidationFailure::malformed(format!("missing claim: {other}")),
        },
        _ => ValidationFailure::malformed(error.to_string()),
    }
}

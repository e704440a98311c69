//! Data-access error types.

/// Errors from the data API clients.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// The data API is unreachable.
    ///
    /// This is always surfaced as-is; there is no fallback to an
    /// unauthenticated client.
    #[error("Data service unavailable: {message}")]
    ServiceUnavailable {
        /// Description of the outage.
        message: String,
    },

    /// The data API rejected the request.
    #[error("Data request failed: HTTP {status}: {message}")]
    Request {
        /// HTTP status returned by the data API.
        status: u16,
        /// Response body or status text.
        message: String,
    },

    /// The response body could not be decoded.
    #[error("Failed to decode response: {message}")]
    Decode {
        /// Description of the decode failure.
        message: String,
    },

    /// The client configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },
}

impl DbError {
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

    /// Returns `true` if the failure is the backing service being down.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::ServiceUnavailable { .. })
    }
}

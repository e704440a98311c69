//! Tenant-scoped and service data clients.
//!
//! The data API enforces row-level security: every row carries a tenant
//! id, and policies compare it against the claims the request presents.
//! [`TenantClient`] forwards the caller's validated bearer token and
//! tenant headers, so the policies see exactly the requesting user.
//! [`ServiceClient`] authenticates with the service key and bypasses
//! row-level policy; it exists for trusted server-side jobs only and is
//! never handed to request handlers acting for an end user.
//!
//! The two are distinct types built through distinct constructors. There
//! is deliberately no flag, method, or conversion that turns one into
//! the other.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use url::Url;

use tessera_auth::claims::TenantContext;
use tessera_auth::extract::BearerToken;

use crate::error::DbError;

/// Header carrying the resolved tenant id for row-level policies.
const TENANT_HEADER: &str = "x-tenant-id";

/// Header carrying the API key class (anon or service).
const API_KEY_HEADER: &str = "apikey";

/// Connection settings for the data API.
#[derive(Debug, Clone)]
pub struct DataApiConfig {
    /// Base URL of the data API.
    pub base_url: Url,

    /// Publishable key identifying this application to the data API.
    /// Grants nothing by itself; row access comes from the forwarded
    /// bearer token.
    pub anon_key: String,

    /// Service key bypassing row-level policy. Optional: deployments
    /// that never run trusted jobs can omit it entirely.
    pub service_key: Option<String>,

    /// HTTP request timeout.
    pub request_timeout: Duration,
}

impl DataApiConfig {
    /// Creates a configuration with the given base URL and anon key.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Configuration` when the URL is unparsable.
    pub fn new(base_url: &str, anon_key: impl Into<String>) -> Result<Self, DbError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| DbError::configuration(format!("invalid data API URL: {e}")))?;

        Ok(Self {
            base_url,
            anon_key: anon_key.into(),
            service_key: None,
            request_timeout: Duration::from_secs(10),
        })
    }

    /// Sets the service key.
    #[must_use]
    pub fn with_service_key(mut self, key: impl Into<String>) -> Self {
        self.service_key = Some(key.into());
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Data client scoped to one request's tenant context.
///
/// Every request carries the caller's bearer token and tenant headers;
/// row-level policies evaluate them server-side. Dropped at the end of
/// the request with the context it was built from.
#[derive(Debug)]
pub struct TenantClient {
    http: reqwest::Client,
    base_url: Url,
    tenant_id: String,
}

impl TenantClient {
    /// Builds a client for a resolved tenant context.
    ///
    /// The context's invariant guarantees a non-empty tenant id; this
    /// is re-checked here because the client is the last gate before
    /// the data API.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Configuration` for an empty tenant id or an
    /// unbuildable HTTP client.
    pub fn new(
        config: &DataApiConfig,
        context: &TenantContext,
        token: &BearerToken,
    ) -> Result<Self, DbError> {
        if context.tenant_id.is_empty() {
            return Err(DbError::configuration("empty tenant id in context"));
        }

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            API_KEY_HEADER,
            header_value(&config.anon_key, "anon key")?,
        );
        headers.insert(
            reqwest::header::AUTHORIZATION,
            header_value(&format!("Bearer {}", token.reveal()), "bearer token")?,
        );
        headers.insert(
            TENANT_HEADER,
            header_value(&context.tenant_id, "tenant id")?,
        );

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| DbError::configuration(e.to_string()))?;

        tracing::debug!(tenant = %context.tenant_id, "Built tenant-scoped data client");

        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            tenant_id: context.tenant_id.clone(),
        })
    }

    /// The tenant this client is scoped to.
    #[must_use]
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Fetches rows from a table, subject to row-level policy.
    ///
    /// # Errors
    ///
    /// `ServiceUnavailable` when the API is unreachable, `Request` when
    /// it rejects the query, `Decode` on an unparsable body.
    pub async fn fetch<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>, DbError> {
        let url = self.table_url(table)?;
        let response = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(into_send_error)?;
        decode_rows(response).await
    }

    /// Inserts rows into a table, subject to row-level policy.
    ///
    /// # Errors
    ///
    /// Same failure surface as [`TenantClient::fetch`].
    pub async fn insert(&self, table: &str, rows: &Value) -> Result<(), DbError> {
        let url = self.table_url(table)?;
        let response = self
            .http
            .post(url)
            .json(rows)
            .send()
            .await
            .map_err(into_send_error)?;
        ensure_success(response).await
    }

    fn table_url(&self, table: &str) -> Result<Url, DbError> {
        self.base_url
            .join(&format!("rest/v1/{table}"))
            .map_err(|e| DbError::configuration(format!("invalid table name {table:?}: {e}")))
    }
}

/// Data client authenticating with the service key.
///
/// Bypasses row-level policy. Built once at startup for trusted
/// server-side operations (migrations, provisioning, cross-tenant
/// reporting); request handlers acting for end users never receive one.
pub struct ServiceClient {
    http: reqwest::Client,
    base_url: Url,
}

impl ServiceClient {
    /// Builds the service client from configuration alone.
    ///
    /// Deliberately accepts no tenant context and no user token: the
    /// privileged path shares nothing with the user-scoped one.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Configuration` when no service key is
    /// configured.
    pub fn new(config: &DataApiConfig) -> Result<Self, DbError> {
        let service_key = config
            .service_key
            .as_deref()
            .ok_or_else(|| DbError::configuration("no service key configured"))?;

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(API_KEY_HEADER, header_value(service_key, "service key")?);
        headers.insert(
            reqwest::header::AUTHORIZATION,
            header_value(&format!("Bearer {service_key}"), "service key")?,
        );

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| DbError::configuration(e.to_string()))?;

        tracing::debug!("Built service data client");

        Ok(Self {
            http,
            base_url: config.base_url.clone(),
        })
    }

    /// Fetches rows from a table, unconstrained by row-level policy.
    ///
    /// # Errors
    ///
    /// Same failure surface as [`TenantClient::fetch`].
    pub async fn fetch<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>, DbError> {
        let url = self
            .base_url
            .join(&format!("rest/v1/{table}"))
            .map_err(|e| DbError::configuration(format!("invalid table name {table:?}: {e}")))?;
        let response = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(into_send_error)?;
        decode_rows(response).await
    }

    /// Probes the data API.
    ///
    /// # Errors
    ///
    /// `ServiceUnavailable` when the API does not answer.
    pub async fn health_check(&self) -> Result<(), DbError> {
        let response = self
            .http
            .get(self.base_url.clone())
            .send()
            .await
            .map_err(into_send_error)?;

        if response.status().is_server_error() {
            return Err(DbError::service_unavailable(format!(
                "health probe returned HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }
}

fn header_value(value: &str, what: &str) -> Result<reqwest::header::HeaderValue, DbError> {
    reqwest::header::HeaderValue::from_str(value)
        .map_err(|_| DbError::configuration(format!("{what} contains invalid header characters")))
}

fn into_send_error(error: reqwest::Error) -> DbError {
    if error.is_connect() || error.is_timeout() {
        DbError::service_unavailable(error.to_string())
    } else {
        DbError::Request {
            status: error.status().map_or(0, |s| s.as_u16()),
            message: error.to_string(),
        }
    }
}

async fn decode_rows<T: DeserializeOwned>(response: reqwest::Response) -> Result<Vec<T>, DbError> {
    let response = check_status(response).await?;
    response.json().await.map_err(|e| DbError::Decode {
        message: e.to_string(),
    })
}

async fn ensure_success(response: reqwest::Response) -> Result<(), DbError> {
    check_status(response).await.map(|_| ())
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, DbError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    if status.is_server_error() {
        Err(DbError::service_unavailable(format!(
            "HTTP {status}: {message}"
        )))
    } else {
        Err(DbError::Request {
            status: status.as_u16(),
            message,
        })
    }
}

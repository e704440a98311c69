//! Server configuration loading.
//!
//! Configuration is a TOML file (`tessera.toml` by default, overridable
//! via `--config` or `TESSERA_CONFIG`) with environment-variable
//! overrides for secrets, so keys never need to live in the file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use tessera_auth::config::AuthConfig;
use tessera_db::{DataApiConfig, DbError};

/// Environment variable overriding the data API anon key.
const ENV_ANON_KEY: &str = "TESSERA_DATABASE_ANON_KEY";

/// Environment variable overriding the data API service key.
const ENV_SERVICE_KEY: &str = "TESSERA_DATABASE_SERVICE_KEY";

/// Errors that can occur loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read {path}: {message}")]
    Io {
        /// Path that failed to read.
        path: String,
        /// Underlying error.
        message: String,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse {path}: {message}")]
    Parse {
        /// Path that failed to parse.
        path: String,
        /// Underlying error.
        message: String,
    },
}

/// Root server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener settings.
    pub server: ListenConfig,

    /// Logging settings.
    pub logging: LoggingConfig,

    /// Authentication bridge settings.
    pub auth: AuthConfig,

    /// Data API settings.
    pub database: DatabaseConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server: ListenConfig::default(),
            logging: LoggingConfig::default(),
            auth: AuthConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

/// Listener settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenConfig {
    /// Bind address.
    pub host: String,

    /// Bind port.
    pub port: u16,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (overridden by `RUST_LOG` when set).
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Data API settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Base URL of the data API.
    pub url: String,

    /// Publishable key. Usually supplied via `TESSERA_DATABASE_ANON_KEY`.
    pub anon_key: String,

    /// Service key. Usually supplied via `TESSERA_DATABASE_SERVICE_KEY`.
    pub service_key: Option<String>,

    /// HTTP request timeout.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:54321".to_string(),
            anon_key: String::new(),
            service_key: None,
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl DatabaseConfig {
    /// Converts into the data API client configuration.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Configuration` when the URL is unparsable.
    pub fn to_data_api_config(&self) -> Result<DataApiConfig, DbError> {
        let mut config = DataApiConfig::new(&self.url, self.anon_key.clone())?
            .with_request_timeout(self.request_timeout);
        if let Some(key) = &self.service_key {
            config = config.with_service_key(key.clone());
        }
        Ok(config)
    }
}

/// Loads configuration from a TOML file, then applies environment
/// overrides for secrets.
///
/// A missing file is not an error: defaults apply, which suits local
/// development where everything comes from the environment.
///
/// # Errors
///
/// Returns `ConfigError` when the file exists but cannot be read or
/// parsed.
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let mut config = if path.exists() {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        toml::from_str(&raw).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?
    } else {
        tracing::info!(path = %path.display(), "No configuration file, using defaults");
        ServerConfig::default()
    };

    apply_env_overrides(&mut config);
    Ok(config)
}

fn apply_env_overrides(config: &mut ServerConfig) {
    if let Ok(key) = std::env::var(ENV_ANON_KEY)
        && !key.is_empty()
    {
        config.database.anon_key = key;
    }
    if let Ok(key) = std::env::var(ENV_SERVICE_KEY)
        && !key.is_empty()
    {
        config.database.service_key = Some(key);
    }
}

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use tessera_auth::jwks::KeySetCacheConfig;
use tessera_auth::middleware::AuthState;
use tessera_db::ServiceClient;
use tessera_server::state::AppState;
use tessera_server::{build_router, load_config, serve};

/// How the configuration path was determined.
#[derive(Debug, Clone, Copy)]
enum ConfigSource {
    /// From --config CLI argument
    CliArgument,
    /// From TESSERA_CONFIG environment variable
    EnvironmentVariable,
    /// Default path (tessera.toml)
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CliArgument => write!(f, "CLI argument (--config)"),
            Self::EnvironmentVariable => write!(f, "environment variable (TESSERA_CONFIG)"),
            Self::Default => write!(f, "default"),
        }
    }
}

#[tokio::main]
async fn main() {
    // Load .env if present, so secrets can come from a local file in
    // development.
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    let (config_path, source) = resolve_config_path();

    let config = match load_config(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    tessera_server::observability::init_tracing(&config.logging.level);
    tracing::info!(
        path = %config_path.display(),
        source = %source,
        "Configuration loaded"
    );

    let auth = match AuthState::from_config(config.auth.clone(), KeySetCacheConfig::default()) {
        Ok(state) => state,
        Err(e) => {
            eprintln!("Authentication bridge initialization failed: {e}");
            std::process::exit(2);
        }
    };

    let data = match config.database.to_data_api_config() {
        Ok(c) => Arc::new(c),
        Err(e) => {
            eprintln!("Data API configuration error: {e}");
            std::process::exit(2);
        }
    };

    // Probe the data API once at startup when trusted operations are
    // configured; a failed probe is logged, not fatal.
    if data.service_key.is_some() {
        match ServiceClient::new(&data) {
            Ok(client) => {
                if let Err(e) = client.health_check().await {
                    tracing::warn!(error = %e, "Data API health probe failed");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Service client unavailable"),
        }
    }

    let state = AppState { auth, data };
    let router = build_router(state);

    if let Err(e) = serve(router, &config.server.host, config.server.port).await {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }
}

/// Resolves the configuration path from CLI, environment, or default.
fn resolve_config_path() -> (PathBuf, ConfigSource) {
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config"
            && let Some(path) = args.next()
        {
            return (PathBuf::from(path), ConfigSource::CliArgument);
        }
    }

    if let Ok(path) = env::var("TESSERA_CONFIG")
        && !path.is_empty()
    {
        return (PathBuf::from(path), ConfigSource::EnvironmentVariable);
    }

    (PathBuf::from("tessera.toml"), ConfigSource::Default)
}

//! # tessera-server
//!
//! The Tessera ERP platform server: configuration loading, tracing
//! bootstrap, and the HTTP surface wiring the authentication bridge
//! (`tessera-auth`) to the data clients (`tessera-db`).

pub mod config;
pub mod observability;
pub mod routes;
pub mod server;
pub mod state;

pub use config::{ConfigError, ServerConfig, load_config};
pub use server::{build_router, serve};
pub use state::AppState;

//! VaultSync server
//!
//! Multi-tenant store for encrypted secrets. The server sees only opaque
//! envelopes; it enforces ownership and optimistic versioning per secret.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod secrets;
pub mod server;
pub mod storage;

use auth::TokenIssuer;
use axum::Router;
use config::ServerConfig;
use server::AppState;
use storage::ServerStorage;

/// Build the application router from a configuration.
pub fn app(config: &ServerConfig) -> anyhow::Result<Router> {
    let storage = ServerStorage::open(&config.storage_path)?;
    Ok(app_with_storage(storage, config))
}

pub fn app_with_storage(storage: ServerStorage, config: &ServerConfig) -> Router {
    let tokens = match &config.token_secret {
        Some(secret) => TokenIssuer::new(secret.as_bytes(), config.token_ttl_secs),
        None => {
            tracing::warn!("No token_secret configured; sessions will not survive a restart");
            TokenIssuer::ephemeral(config.token_ttl_secs)
        }
    };
    server::build_router(AppState::new(storage, tokens), config)
}

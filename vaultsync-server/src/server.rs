//! Axum router setup.

use crate::auth::{auth_middleware, AuthService, TokenIssuer};
use crate::config::ServerConfig;
use crate::handlers::{secret, sync, user};
use crate::secrets::SecretService;
use crate::storage::ServerStorage;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthService,
    pub secrets: SecretService,
    pub tokens: TokenIssuer,
}

impl AppState {
    pub fn new(storage: ServerStorage, tokens: TokenIssuer) -> Self {
        Self {
            auth: AuthService::new(storage.clone(), tokens.clone()),
            secrets: SecretService::new(storage),
            tokens,
        }
    }
}

pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    // Authenticated routes
    let authenticated = Router::new()
        .route("/api/sync", get(sync::version_list))
        .route(
            "/api/secret",
            get(secret::get_secret)
                .put(secret::put_secret)
                .delete(secret::delete_secret),
        )
        .route("/api/ping", get(ping))
        .layer(middleware::from_fn_with_state(
            state.tokens.clone(),
            auth_middleware,
        ));

    // Unauthenticated routes
    let public = Router::new()
        .route("/api/user/register", post(user::register))
        .route("/api/user/login", post(user::login));

    Router::new()
        .merge(authenticated)
        .merge(public)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(config.max_payload_size))
        .with_state(state)
}

async fn ping() -> &'static str {
    "ok"
}

//! Account registration and login.

use super::json_body;
use crate::auth::AuthRequest;
use crate::error::ServerError;
use crate::server::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

#[derive(Serialize)]
pub struct TokenResponse {
    pub token: String,
}

pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<AuthRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ServerError> {
    let req = json_body(payload)?;
    let identity = state.auth.create_user(&req)?;
    let token = state.auth.issue_token(identity)?;

    Ok(token_response(token))
}

pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<AuthRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ServerError> {
    let req = json_body(payload)?;
    let identity = state.auth.authenticate(&req)?;
    let token = state.auth.issue_token(identity)?;

    Ok(token_response(token))
}

fn token_response(token: String) -> impl IntoResponse {
    (
        [(header::AUTHORIZATION, format!("Bearer {}", token))],
        Json(TokenResponse { token }),
    )
}

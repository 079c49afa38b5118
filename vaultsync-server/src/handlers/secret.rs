//! Single-secret handlers: `PUT`, `GET` and `DELETE /api/secret`.

use super::json_body;
use crate::auth::Identity;
use crate::error::ServerError;
use crate::secrets::{SecretRequest, SecretResponse, SecretVersion};
use crate::server::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::{Extension, Json};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Deserialize)]
pub struct SecretIdRequest {
    pub id: Uuid,
}

pub async fn put_secret(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    payload: Result<Json<SecretRequest>, JsonRejection>,
) -> Result<Json<SecretVersion>, ServerError> {
    let req = json_body(payload)?;
    let version = state.secrets.upsert(&identity.user_id, &req)?;
    Ok(Json(version))
}

pub async fn get_secret(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    payload: Result<Json<SecretIdRequest>, JsonRejection>,
) -> Result<Json<SecretResponse>, ServerError> {
    let req = json_body(payload)?;
    let secret = state.secrets.get(&identity.user_id, &req.id)?;
    Ok(Json(secret))
}

pub async fn delete_secret(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    payload: Result<Json<SecretIdRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ServerError> {
    let req = json_body(payload)?;
    state.secrets.delete(&identity.user_id, &req.id)?;
    Ok(Json(serde_json::json!({ "status": "deleted" })))
}

//! Manifest handler.

use crate::auth::Identity;
use crate::error::ServerError;
use crate::server::AppState;
use axum::extract::State;
use axum::{Extension, Json};
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Serialize)]
pub struct VersionListResponse {
    pub list: BTreeMap<Uuid, i64>,
}

/// `GET /api/sync`: id → version for every live secret of the caller.
pub async fn version_list(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<VersionListResponse>, ServerError> {
    let list = state.secrets.version_list(&identity.user_id)?;

    tracing::debug!(
        "Device {} fetched manifest ({} secrets)",
        identity.device_id,
        list.len()
    );
    Ok(Json(VersionListResponse { list }))
}

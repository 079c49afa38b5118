//! HTTP handlers.

pub mod secret;
pub mod sync;
pub mod user;

use crate::error::ServerError;
use axum::extract::rejection::JsonRejection;
use axum::Json;

/// Unwrap a JSON body, turning a malformed one into a 400.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ServerError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ServerError::BadRequest(rejection.body_text()))
}

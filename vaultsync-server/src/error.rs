//! Server error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Messages sent for each 422 condition. Clients match on these.
pub mod messages {
    pub const NOT_FOUND: &str = "secret not found";
    pub const VERSION_TOO_LOW: &str = "version too low";
    pub const ITEM_IS_DELETED: &str = "secret is deleted";
    pub const WRONG_AUTH_DATA: &str = "wrong auth data";
    pub const CONFLICT_SAVE_USER: &str = "login already exists";
}

/// Errors from the auth and secret services.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),

    /// Absent, soft-deleted, or owned by someone else.
    #[error("secret not found")]
    NotFound,

    #[error("version too low")]
    VersionTooLow,

    #[error("secret is deleted")]
    ItemIsDeleted,

    #[error("wrong auth data")]
    WrongAuthData,

    #[error("login already exists")]
    ConflictSaveUser,

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<rusqlite::Error> for ServiceError {
    fn from(e: rusqlite::Error) -> Self {
        tracing::error!("Storage error: {}", e);
        Self::Internal(e.to_string())
    }
}

/// Errors a handler can return, mapped to HTTP status codes.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::BadRequest(e) => (StatusCode::BAD_REQUEST, e.clone()),
            Self::Unauthorized(e) => (StatusCode::UNAUTHORIZED, e.clone()),
            Self::Service(ServiceError::Internal(e)) => {
                tracing::error!("Internal error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            Self::Service(e) => (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

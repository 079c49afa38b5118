//! The interface the sync coordinator uses to reach the server.

use crate::sync::models::{RemoteSecret, SecretVersion, VersionList};
use std::future::Future;
use thiserror::Error;
use uuid::Uuid;

/// Errors reported by a [`SecretRemote`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Secret not found")]
    NotFound,

    /// The server holds a newer version; pull before retrying.
    #[error("Version too low")]
    VersionTooLow,

    #[error("Secret is deleted")]
    ItemIsDeleted,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Wrong login, password or master password")]
    WrongAuthData,

    #[error("Login already exists")]
    ConflictSaveUser,

    #[error("Not authenticated")]
    Unauthorized,

    #[error("Request timed out")]
    Timeout,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl RemoteError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Every later call in the session would fail the same way.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Unauthorized | Self::WrongAuthData)
    }
}

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Ownership-scoped access to the server's secret store.
///
/// The owning user is implied by the authenticated session.
pub trait SecretRemote: Send + Sync {
    /// Manifest of every non-deleted secret.
    fn version_list(&self) -> impl Future<Output = RemoteResult<VersionList>> + Send;

    fn get(&self, id: Uuid) -> impl Future<Output = RemoteResult<RemoteSecret>> + Send;

    /// Create a secret. The server assigns the id and version.
    fn add(&self, ver: i64, data: &str) -> impl Future<Output = RemoteResult<SecretVersion>> + Send;

    /// Replace a secret's data, citing the version it was based on.
    fn update(
        &self,
        id: Uuid,
        ver: i64,
        data: &str,
    ) -> impl Future<Output = RemoteResult<SecretVersion>> + Send;

    fn delete(&self, id: Uuid) -> impl Future<Output = RemoteResult<()>> + Send;
}

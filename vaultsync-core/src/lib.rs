//! VaultSync core library
//!
//! Client side of a personal credential vault: the envelope codec, the
//! typed secret model, the local vault store and the sync coordinator that
//! reconciles it with a VaultSync server.

pub mod crypto;
pub mod platform;
pub mod secret;
pub mod store;
pub mod sync;
pub mod vault;

pub use crypto::{CryptoError, KdfParams, MasterKey};
pub use platform::{get_config_dir, get_data_dir, get_default_config_path, get_default_vault_path};
pub use secret::{Secret, SecretBody, SecretHeader, SecretKind};
pub use store::{
    DeleteOutcome, LocalStore, SecretMeta, SecretRecord, SecretStatus, StoreError, SyncMetadata,
};
pub use sync::{
    ConflictPolicy, RemoteError, SecretRemote, SyncCancel, SyncCoordinator, SyncOptions, SyncReport,
};
#[cfg(feature = "sync")]
pub use sync::SyncClient;
pub use vault::{Vault, VaultItem};

use thiserror::Error;

/// Result type for vault operations
pub type Result<T> = std::result::Result<T, VaultError>;

/// General error type for vault operations
#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("A sync pass is already running")]
    SyncInProgress,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl VaultError {
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Crypto(e) if e.is_decode())
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Store(e) => e.is_not_found(),
            Self::Remote(e) => e.is_not_found(),
            _ => false,
        }
    }

    pub fn is_stale_write(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_stale_write())
    }

    /// The remote rejected our credentials or token.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Remote(e) if e.is_auth())
    }
}

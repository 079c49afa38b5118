//! Synchronization with a VaultSync server
//!
//! - Version-manifest reconciliation with optimistic concurrency
//! - Configurable conflict policy for rejected edits
//! - Pluggable remote; the HTTP client is behind the `sync` feature

#[cfg(feature = "sync")]
pub mod client;
pub mod config;
pub mod conflict;
pub mod coordinator;
pub mod models;
pub mod remote;

#[cfg(feature = "sync")]
pub use client::SyncClient;
pub use config::SyncOptions;
pub use conflict::{ConflictKind, ConflictPolicy, Resolution};
pub use coordinator::{SyncCancel, SyncConflict, SyncCoordinator, SyncFailure, SyncReport};
pub use models::{RemoteSecret, SecretVersion, VersionList};
pub use remote::{RemoteError, RemoteResult, SecretRemote};

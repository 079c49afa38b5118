//! Cryptographic primitives for the vault.
//!
//! This module provides:
//! - Argon2id master-key derivation
//! - The AES-256-GCM envelope codec used for every stored secret
//! - Zeroization of key material

pub mod envelope;
pub mod kdf;

pub use envelope::{decode, encode, open, seal};
pub use kdf::{KdfParams, MasterKey};

use thiserror::Error;

/// Errors that can occur in cryptographic operations
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Key derivation failed: {0}")]
    KdfFailed(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Wrong key, tampered envelope, truncated blob or broken encoding.
    #[error("Decode failed: {0}")]
    Decode(String),

    #[error("Invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },
}

impl CryptoError {
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode(_))
    }
}

/// Result type for crypto operations
pub type Result<T> = std::result::Result<T, CryptoError>;

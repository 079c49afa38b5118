//! Argon2id derivation of the vault master key.
//!
//! Every device of the same user must derive the same key from the same
//! master password, so the salt is derived from the login rather than
//! stored. Default parameters:
//! - Memory cost: 64 MiB (65,536 KiB)
//! - Time cost: 3 iterations
//! - Parallelism: 1 lane
//! - Output length: 32 bytes

use crate::crypto::{CryptoError, Result};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

pub const KEY_LEN: usize = 32;
const SALT_LEN: usize = 16;

const KDF_CONTEXT: &[u8] = b"vaultsync/kdf/v1";
const AUTH_CONTEXT: &[u8] = b"vaultsync/auth/v1";

/// Minimum memory cost accepted by [`KdfParams::validate`] (19 MiB).
const MIN_MEM_COST: u32 = 19_456;

/// Parameters for Argon2id key derivation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB
    pub mem_cost: u32,

    /// Time cost (number of iterations)
    pub time_cost: u32,

    /// Parallelism (number of lanes)
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            mem_cost: 65_536, // 64 MiB
            time_cost: 3,
            parallelism: 1,
        }
    }
}

impl KdfParams {
    /// Verify that parameters are within acceptable ranges
    pub fn validate(&self) -> Result<()> {
        if self.mem_cost < MIN_MEM_COST {
            return Err(CryptoError::KdfFailed(
                "Memory cost too low (minimum: 19 MiB)".to_string(),
            ));
        }
        if self.time_cost < 1 {
            return Err(CryptoError::KdfFailed(
                "Time cost too low (minimum: 1)".to_string(),
            ));
        }
        if self.parallelism < 1 {
            return Err(CryptoError::KdfFailed(
                "Parallelism too low (minimum: 1)".to_string(),
            ));
        }
        Ok(())
    }
}

/// The 256-bit key every envelope is sealed with. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    key: [u8; KEY_LEN],
}

impl MasterKey {
    /// Derive the master key with default parameters.
    pub fn derive(master_password: &str, login: &str) -> Result<Self> {
        Self::derive_with_params(master_password, login, &KdfParams::default())
    }

    pub fn derive_with_params(
        master_password: &str,
        login: &str,
        params: &KdfParams,
    ) -> Result<Self> {
        params.validate()?;

        let params_obj = Params::new(
            params.mem_cost,
            params.time_cost,
            params.parallelism,
            Some(KEY_LEN),
        )
        .map_err(|e| CryptoError::KdfFailed(format!("Invalid parameters: {}", e)))?;

        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params_obj);

        let mut key = [0u8; KEY_LEN];
        argon2
            .hash_password_into(master_password.as_bytes(), &login_salt(login), &mut key)
            .map_err(|e| CryptoError::KdfFailed(format!("Hashing failed: {}", e)))?;

        Ok(Self { key })
    }

    /// Random key, for vaults that never derive from a password.
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LEN];
        rand::rngs::OsRng.fill_bytes(&mut key);
        Self { key }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY_LEN {
            return Err(CryptoError::InvalidKeyLength {
                expected: KEY_LEN,
                got: bytes.len(),
            });
        }
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(bytes);
        Ok(Self { key })
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.key
    }

    /// Credential proving knowledge of the master key to the server
    /// without revealing it: hex SHA-256 over a context tag and the key.
    pub fn auth_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(AUTH_CONTEXT);
        hasher.update(self.key);
        hex::encode(hasher.finalize())
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey(..)")
    }
}

fn login_salt(login: &str) -> [u8; SALT_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(KDF_CONTEXT);
    hasher.update(login.as_bytes());
    let digest = hasher.finalize();

    let mut salt = [0u8; SALT_LEN];
    salt.copy_from_slice(&digest[..SALT_LEN]);
    salt
}

//! Vault service - typed secrets over the local store and the envelope codec


use crate::{
    crypto::{self, CryptoError, MasterKey},
    secret::{Secret, SecretHeader},
    store::{DeleteOutcome, LocalStore, SecretMeta, SecretRecord, SecretStatus},
    Result, VaultError,
};
use uuid::Uuid;

/// Plaintext sealed into `key_check` so a wrong master key fails on unlock.
const KEY_CHECK_MARKER: &[u8] = b"vaultsync-key-check";

/// A decoded record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultItem {
    pub local_id: i64,
    pub secret_id: Option<Uuid>,
    pub version: i64,
    pub status: SecretStatus,
    pub last_modified: i64,
    pub secret: Secret,
}

/// An unlocked vault: a store plus the key its envelopes are sealed with.
#[derive(Clone)]
pub struct Vault {
    store: LocalStore,
    key: MasterKey,
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault").field("key", &self.key).finish_non_exhaustive()
    }
}

impl Vault {
    /// Wrap a store without checking the key.
    pub fn new(store: LocalStore, key: MasterKey) -> Self {
        Self { store, key }
    }

    /// Open a vault, verifying the key against the stored key check.
    ///
    /// The first unlock of a fresh store records the check.
    pub fn unlock(store: LocalStore, key: MasterKey) -> Result<Self> {
        let mut metadata = store.metadata()?;

        match &metadata.key_check {
            Some(check) => {
                let marker = crypto::decode(check, &key)?;
                if marker != KEY_CHECK_MARKER {
                    return Err(CryptoError::Decode("key check mismatch".to_string()).into());
                }
            }
            None => {
                metadata.key_check = Some(crypto::encode(KEY_CHECK_MARKER, &key)?);
                store.save_metadata(&metadata)?;
                tracing::debug!("Recorded key check for new vault");
            }
        }

        Ok(Self { store, key })
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn key(&self) -> &MasterKey {
        &self.key
    }

    /// Add a secret. Returns its local id.
    pub fn add(&self, secret: &Secret) -> Result<i64> {
        let (header, ciphertext) = self.seal_secret(secret)?;
        let local_id = self.store.add(&header, &ciphertext)?;
        tracing::debug!("Added secret {} ({})", local_id, secret.kind());
        Ok(local_id)
    }

    /// Decode a record in full.
    pub fn read(&self, local_id: i64) -> Result<VaultItem> {
        let record = self.store.get(local_id)?;
        let secret = self.open_record(&record)?;
        Ok(VaultItem {
            local_id: record.local_id,
            secret_id: record.secret_id,
            version: record.version,
            status: record.status,
            last_modified: record.last_modified,
            secret,
        })
    }

    /// Replace a secret's content.
    ///
    /// `expected_last_modified` is the marker from the caller's earlier
    /// read. Returns the new marker.
    pub fn edit(&self, local_id: i64, expected_last_modified: i64, secret: &Secret) -> Result<i64> {
        let (header, ciphertext) = self.seal_secret(secret)?;
        let last_modified = self
            .store
            .update(local_id, expected_last_modified, &header, &ciphertext)?;
        tracing::debug!("Edited secret {}", local_id);
        Ok(last_modified)
    }

    pub fn delete(&self, local_id: i64) -> Result<DeleteOutcome> {
        let outcome = self.store.soft_delete(local_id)?;
        tracing::debug!("Deleted secret {} ({:?})", local_id, outcome);
        Ok(outcome)
    }

    /// List every record without decoding.
    pub fn list(&self) -> Result<Vec<SecretMeta>> {
        Ok(self.store.list_meta()?)
    }

    /// Serialize and seal a secret.
    pub fn seal_secret(&self, secret: &Secret) -> Result<(SecretHeader, String)> {
        let plaintext = serde_json::to_vec(secret)?;
        let ciphertext = crypto::encode(&plaintext, &self.key)?;
        Ok((secret.header(), ciphertext))
    }

    /// Open an envelope into a typed secret.
    pub fn open_secret(&self, ciphertext: &str) -> Result<Secret> {
        open_secret(&self.key, ciphertext)
    }

    /// Open a record's envelope and check it against the plaintext columns.
    pub fn open_record(&self, record: &SecretRecord) -> Result<Secret> {
        let secret = self.open_secret(&record.ciphertext)?;
        if secret.header() != record.header() {
            tracing::warn!("Header mismatch on secret {}", record.local_id);
            return Err(CryptoError::Decode(format!(
                "header of record {} does not match its envelope",
                record.local_id
            ))
            .into());
        }
        Ok(secret)
    }
}

/// Decode an envelope and deserialize the secret inside it.
///
/// Malformed plaintext under a valid tag is reported as a decode failure.
pub fn open_secret(key: &MasterKey, ciphertext: &str) -> Result<Secret> {
    let plaintext = crypto::decode(ciphertext, key)?;
    serde_json::from_slice(&plaintext).map_err(|e| {
        VaultError::from(CryptoError::Decode(format!("invalid secret payload: {}", e)))
    })
}

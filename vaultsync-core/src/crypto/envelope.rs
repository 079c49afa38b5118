//! Envelope codec: authenticated encryption of serialized secrets.
//!
//! Uses AES-256-GCM with the vault master key. The binary layout is:
//! `nonce(12) || ciphertext || auth_tag(16)`
//!
//! The text form (what the local store and the wire carry) is standard
//! base64 of that layout. The codec knows nothing about secret structure.

use crate::crypto::{CryptoError, MasterKey, Result};
use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine};

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Encrypt a payload. Returns `nonce(12) || ciphertext || auth_tag(16)`.
///
/// A fresh random nonce is drawn per call, so sealing the same plaintext
/// twice yields different blobs.
pub fn seal(key: &MasterKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    // aes-gcm appends the tag to the ciphertext
    let ciphertext_with_tag = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext_with_tag.len());
    blob.extend_from_slice(nonce.as_slice());
    blob.extend_from_slice(&ciphertext_with_tag);
    Ok(blob)
}

/// Decrypt a blob produced by [`seal`].
///
/// Fails with [`CryptoError::Decode`] on a wrong key or any modification.
pub fn open(key: &MasterKey, blob: &[u8]) -> Result<Vec<u8>> {
    if blob.len() < NONCE_LEN + TAG_LEN {
        return Err(CryptoError::Decode("envelope too short".to_string()));
    }

    let (nonce_bytes, ciphertext_with_tag) = blob.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext_with_tag)
        .map_err(|_| CryptoError::Decode("authentication failed".to_string()))
}

/// Seal and base64-encode a payload.
pub fn encode(plaintext: &[u8], key: &MasterKey) -> Result<String> {
    seal(key, plaintext).map(|blob| STANDARD.encode(blob))
}

/// Base64-decode and open an envelope.
pub fn decode(envelope: &str, key: &MasterKey) -> Result<Vec<u8>> {
    let blob = STANDARD
        .decode(envelope)
        .map_err(|e| CryptoError::Decode(format!("invalid envelope encoding: {}", e)))?;
    open(key, &blob)
}

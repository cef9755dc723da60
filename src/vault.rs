// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Key Vault
//!
//! AES-256-GCM sealing of custodial private keys.
//!
//! ## Wire format
//!
//! ```text
//! nonce (12 bytes) || ciphertext || auth_tag (16 bytes)
//! ```
//!
//! A fresh random nonce is drawn for every call to [`KeyVault::encrypt`].
//! The vault key itself lives only in process memory; it is never written
//! next to the ciphertexts it produces.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use zeroize::Zeroizing;

/// Vault key length in bytes (AES-256).
pub const KEY_LEN: usize = 32;

/// AES-GCM nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// AES-GCM authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// Errors produced by the key vault.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VaultError {
    #[error("Invalid vault key: {0}")]
    InvalidKey(String),

    #[error("Encryption failed")]
    Encryption,

    /// Wrong key, tampered ciphertext, or truncated input.
    #[error("Decryption failed: ciphertext could not be authenticated")]
    Decryption,
}

/// Symmetric vault for custodial signing keys.
///
/// Cheap to clone behind an `Arc`; all operations take `&self` and are
/// safe to call from any number of tasks at once.
pub struct KeyVault {
    cipher: Aes256Gcm,
}

impl KeyVault {
    /// Create a vault from raw key bytes.
    pub fn new(key: &[u8]) -> Result<Self, VaultError> {
        if key.len() != KEY_LEN {
            return Err(VaultError::InvalidKey(format!(
                "expected {KEY_LEN} bytes, got {}",
                key.len()
            )));
        }
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| VaultError::InvalidKey(e.to_string()))?;
        Ok(Self { cipher })
    }

    /// Create a vault from a hex-encoded 32-byte key.
    pub fn from_hex(key_hex: &str) -> Result<Self, VaultError> {
        let trimmed = key_hex.trim();
        let trimmed = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = Zeroizing::new(
            hex::decode(trimmed).map_err(|e| VaultError::InvalidKey(format!("not hex: {e}")))?,
        );
        Self::new(&bytes)
    }

    /// Create a vault with a random key that lives only as long as the process.
    ///
    /// Anything sealed by an ephemeral vault is unreadable after a restart.
    pub fn ephemeral() -> Self {
        let key = Aes256Gcm::generate_key(OsRng);
        Self {
            cipher: Aes256Gcm::new(&key),
        }
    }

    /// Seal `plaintext`, returning `nonce || ciphertext+tag`.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, VaultError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| VaultError::Encryption)?;

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    /// Open data produced by [`KeyVault::encrypt`].
    ///
    /// The returned buffer is wiped when dropped.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>, VaultError> {
        if ciphertext.len() < NONCE_LEN + TAG_LEN {
            return Err(VaultError::Decryption);
        }

        let (nonce, sealed) = ciphertext.split_at(NONCE_LEN);
        let nonce: [u8; NONCE_LEN] = nonce.try_into().map_err(|_| VaultError::Decryption)?;
        self.cipher
            .decrypt(&Nonce::from(nonce), sealed)
            .map(Zeroizing::new)
            .map_err(|_| VaultError::Decryption)
    }
}

impl std::fmt::Debug for KeyVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KeyVault(..)")
    }
}

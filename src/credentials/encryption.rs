//! AES-256-GCM encryption for credential tokens.
//!
//! Each token is encrypted separately with a unique nonce. The key is decoded
//! once at startup and cached in a [`TokenCipher`] shared by the store.
//! Ciphertext layout: `nonce (12 bytes) || ciphertext || tag`.

use crate::error::{BridgeError, Result};
use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

/// Size of the encryption key in bytes (256 bits)
const KEY_SIZE: usize = 32;

/// Size of the nonce in bytes (96 bits, standard for GCM)
const NONCE_SIZE: usize = 12;

/// Validates that the key is exactly 32 bytes when base64 decoded.
///
/// # Returns
/// * `Ok(Vec<u8>)` - Decoded key bytes (32 bytes)
/// * `Err(Configuration)` - If key is invalid length or invalid base64
pub fn validate_key(key_base64: &str) -> Result<Vec<u8>> {
    let key_bytes = BASE64.decode(key_base64.trim()).map_err(|_| {
        BridgeError::Configuration("encryption key is not valid base64".to_string())
    })?;

    if key_bytes.len() != KEY_SIZE {
        return Err(BridgeError::Configuration(format!(
            "encryption key must be {} bytes (256 bits), got {} bytes",
            KEY_SIZE,
            key_bytes.len()
        )));
    }

    Ok(key_bytes)
}

/// Generates a fresh random key, base64-encoded.
pub fn generate_key() -> String {
    let key = Aes256Gcm::generate_key(&mut OsRng);
    BASE64.encode(key)
}

/// Symmetric cipher holding the process-wide key.
#[derive(Clone)]
pub struct TokenCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TokenCipher { .. }")
    }
}

impl TokenCipher {
    /// Builds a cipher from a base64-encoded key.
    pub fn new(key_base64: &str) -> Result<Self> {
        let key_bytes = validate_key(key_base64)?;
        let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    /// Builds a cipher from an optional configured key.
    ///
    /// Fails with `Configuration` if no key is configured.
    pub fn from_config(key_base64: Option<&str>) -> Result<Self> {
        match key_base64 {
            Some(key) if !key.trim().is_empty() => Self::new(key),
            _ => Err(BridgeError::Configuration(
                "FIELD_ENCRYPTION_KEY not set".to_string(),
            )),
        }
    }

    /// Encrypts plaintext with a random nonce.
    ///
    /// Fails with `Input` on empty plaintext.
    pub fn encrypt(&self, plaintext: &str) -> Result<Vec<u8>> {
        if plaintext.is_empty() {
            return Err(BridgeError::Input("cannot encrypt empty string".to_string()));
        }

        // Generate random nonce (never reuse!)
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| BridgeError::Integrity("encryption failed".to_string()))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Decrypts bytes produced by [`TokenCipher::encrypt`].
    ///
    /// Fails with `Input` on empty input and `Integrity` if authentication
    /// fails (tampered data or wrong key).
    pub fn decrypt(&self, data: &[u8]) -> Result<String> {
        if data.is_empty() {
            return Err(BridgeError::Input("cannot decrypt empty bytes".to_string()));
        }
        if data.len() <= NONCE_SIZE {
            return Err(BridgeError::Integrity("ciphertext too short".to_string()));
        }

        let (nonce_bytes, ciphertext) = data.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self.cipher.decrypt(nonce, ciphertext).map_err(|_| {
            BridgeError::Integrity("decryption failed (wrong key or corrupted data)".to_string())
        })?;

        String::from_utf8(plaintext)
            .map_err(|_| BridgeError::Integrity("decrypted data is not valid UTF-8".to_string()))
    }
}

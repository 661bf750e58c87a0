//! Encrypted Field Codec
//!
//! AES-256-GCM encryption for free-text columns. Every free-text field
//! (letters, replies, chat turns, persona narratives, report content,
//! memory excerpts) passes through this codec at the storage boundary, so
//! code above the repository methods only ever sees plaintext.
//!
//! Wire format: base64 of `nonce[12] || ciphertext_with_tag`, one fresh
//! random nonce per encode. Empty input passes through unchanged.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::utils::error::{AppError, AppResult};

const NONCE_SIZE: usize = 12;
const KEY_SIZE: usize = 32;

/// Transparent encrypt/decrypt for stored text fields.
#[derive(Clone)]
pub struct FieldCipher {
    cipher: Aes256Gcm,
}

impl FieldCipher {
    /// Build a cipher from a 64-character hex key (32 bytes).
    pub fn from_hex_key(hex_key: &str) -> AppResult<Self> {
        let key_bytes = hex::decode(hex_key)
            .map_err(|e| AppError::crypto(format!("Invalid hex encryption key: {}", e)))?;
        if key_bytes.len() != KEY_SIZE {
            return Err(AppError::crypto(format!(
                "Encryption key must be {} bytes, got {}",
                KEY_SIZE,
                key_bytes.len()
            )));
        }
        let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    /// Encrypt a field value. Empty input passes through unchanged.
    pub fn encode(&self, plaintext: &str) -> AppResult<String> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| AppError::crypto(format!("Field encryption failed: {}", e)))?;

        // Combine: nonce || ciphertext (includes GCM tag)
        let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        Ok(BASE64.encode(combined))
    }

    /// Decrypt a stored field value. Empty input passes through unchanged.
    pub fn decode(&self, encoded: &str) -> AppResult<String> {
        if encoded.is_empty() {
            return Ok(String::new());
        }

        let data = BASE64
            .decode(encoded)
            .map_err(|e| AppError::crypto(format!("Base64 decode failed: {}", e)))?;

        if data.len() <= NONCE_SIZE {
            return Err(AppError::crypto("Invalid encrypted field: too short"));
        }

        let nonce = Nonce::from_slice(&data[..NONCE_SIZE]);
        let ciphertext = &data[NONCE_SIZE..];

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| AppError::crypto("Decryption failed: wrong key or corrupted data"))?;

        String::from_utf8(plaintext)
            .map_err(|e| AppError::crypto(format!("Decrypted field is not valid UTF-8: {}", e)))
    }

    /// Encrypt an optional field, mapping `None` through unchanged.
    pub fn encode_opt(&self, plaintext: Option<&str>) -> AppResult<Option<String>> {
        plaintext.map(|p| self.encode(p)).transpose()
    }

    /// Decrypt an optional field, mapping `None` through unchanged.
    pub fn decode_opt(&self, encoded: Option<&str>) -> AppResult<Option<String>> {
        encoded.map(|e| self.decode(e)).transpose()
    }
}

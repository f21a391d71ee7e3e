//! AES-256-GCM authenticated encryption
//!
//! Ciphertext format: `version | salt | nonce | ciphertext | auth_tag`
//! - Version: 1 byte (currently `1`)
//! - Salt: 16 bytes, PBKDF2 salt for this ciphertext only
//! - Nonce: 12 bytes (96 bits) - standard for GCM
//! - Ciphertext: variable length, followed by the 16-byte auth tag

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;

use super::engine::CryptoEngine;
use super::key_derivation::{combine_credentials, generate_salt, stretch_key, SALT_LEN};
use super::SecretBytes;
use crate::error::{Result, VaultError};

/// Current ciphertext format version
pub const FORMAT_VERSION: u8 = 1;

/// GCM nonce length
pub const NONCE_LEN: usize = 12;

/// GCM authentication tag length
pub const TAG_LEN: usize = 16;

const HEADER_LEN: usize = 1 + SALT_LEN + NONCE_LEN;

/// Smallest valid ciphertext: header plus the tag of an empty plaintext
pub const MIN_CIPHERTEXT_LEN: usize = HEADER_LEN + TAG_LEN;

/// Parsed ciphertext envelope
#[derive(Debug, Clone)]
pub struct Envelope {
    /// PBKDF2 salt
    pub salt: [u8; SALT_LEN],
    /// GCM nonce
    pub nonce: [u8; NONCE_LEN],
    /// Ciphertext with the auth tag appended
    pub sealed: Vec<u8>,
}

impl Envelope {
    /// Serialize to the on-the-wire byte layout
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.sealed.len());
        out.push(FORMAT_VERSION);
        out.extend_from_slice(&self.salt);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.sealed);
        out
    }

    /// Parse from the on-the-wire byte layout
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < MIN_CIPHERTEXT_LEN {
            return Err(VaultError::Format(format!(
                "Ciphertext too short: expected at least {}, got {}",
                MIN_CIPHERTEXT_LEN,
                bytes.len()
            )));
        }
        if bytes[0] != FORMAT_VERSION {
            return Err(VaultError::Format(format!(
                "Unsupported ciphertext version: {}",
                bytes[0]
            )));
        }

        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&bytes[1..1 + SALT_LEN]);

        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&bytes[1 + SALT_LEN..HEADER_LEN]);

        Ok(Self {
            salt,
            nonce,
            sealed: bytes[HEADER_LEN..].to_vec(),
        })
    }
}

/// Default [`CryptoEngine`]: PBKDF2-HMAC-SHA256 key stretching + AES-256-GCM
#[derive(Debug, Clone, Copy, Default)]
pub struct AesGcmEngine;

impl AesGcmEngine {
    pub fn new() -> Self {
        Self
    }
}

impl CryptoEngine for AesGcmEngine {
    fn derive_key(&self, password: &SecretBytes, pin: &SecretBytes) -> Result<SecretBytes> {
        combine_credentials(password, pin)
    }

    fn encrypt(&self, plaintext: &[u8], key: SecretBytes, iterations: u32) -> Result<Vec<u8>> {
        let salt = generate_salt();
        let cipher_key = stretch_key(key.expose(), &salt, iterations)
            .map_err(|e| VaultError::Encryption(e.to_string()))?;
        drop(key);

        let cipher = Aes256Gcm::new_from_slice(&cipher_key[..])
            .map_err(|e| VaultError::Encryption(e.to_string()))?;

        // Generate random nonce (12 bytes for GCM)
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        // aes-gcm appends the auth tag to the ciphertext
        let sealed = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|e| VaultError::Encryption(e.to_string()))?;

        Ok(Envelope {
            salt,
            nonce,
            sealed,
        }
        .to_bytes())
    }

    fn decrypt(&self, ciphertext: &[u8], key: SecretBytes, iterations: u32) -> Result<SecretBytes> {
        let envelope = Envelope::from_bytes(ciphertext)?;

        let cipher_key = stretch_key(key.expose(), &envelope.salt, iterations)?;
        drop(key);

        let cipher = Aes256Gcm::new_from_slice(&cipher_key[..])
            .map_err(|e| VaultError::Decryption(e.to_string()))?;

        cipher
            .decrypt(Nonce::from_slice(&envelope.nonce), envelope.sealed.as_slice())
            .map(SecretBytes::new)
            .map_err(|_| VaultError::WrongKey)
    }
}

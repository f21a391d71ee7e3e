//! Cryptographic primitives for the vault
//!
//! This module provides:
//! - The [`CryptoEngine`] seam and its AES-256-GCM implementation
//! - PBKDF2 key stretching and password + pin key combination
//! - Secret buffers that are zeroed on drop

mod encryption;
mod engine;
mod key_derivation;
mod secure_memory;

pub use encryption::{AesGcmEngine, Envelope, FORMAT_VERSION, MIN_CIPHERTEXT_LEN, NONCE_LEN, TAG_LEN};
pub use engine::CryptoEngine;
pub use key_derivation::{
    combine_credentials, generate_salt, stretch_key, DEFAULT_ITERATIONS, KEY_LEN, SALT_LEN,
};
pub use secure_memory::{wipe, SecretBytes};

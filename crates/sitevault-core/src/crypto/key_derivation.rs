//! Key derivation
//!
//! - Password + pin are combined into one 256-bit account key with
//!   HMAC-SHA256 (keyed by the pin).
//! - Every encryption stretches its key with PBKDF2-HMAC-SHA256 over a fresh
//!   random salt at the configured iteration count.

use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use zeroize::{Zeroize, Zeroizing};

use super::SecretBytes;
use crate::error::{Result, VaultError};

type HmacSha256 = Hmac<Sha256>;

/// Salt length in bytes
pub const SALT_LEN: usize = 16;

/// Derived key length in bytes (AES-256)
pub const KEY_LEN: usize = 32;

/// Default work factor for PBKDF2
pub const DEFAULT_ITERATIONS: u32 = 100_000;

/// Generate a cryptographically secure random salt
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Combine a password and a pin into a single 32-byte key
pub fn combine_credentials(password: &SecretBytes, pin: &SecretBytes) -> Result<SecretBytes> {
    if password.is_empty() || pin.is_empty() {
        return Err(VaultError::Validation(
            "Password and pin must not be empty".to_string(),
        ));
    }

    let mut mac = <HmacSha256 as Mac>::new_from_slice(pin.expose())
        .map_err(|e| VaultError::KeyDerivation(e.to_string()))?;
    mac.update(password.expose());

    let mut digest = mac.finalize().into_bytes();
    let key = SecretBytes::from_slice(&digest);
    digest.as_mut_slice().zeroize();

    Ok(key)
}

/// Stretch `key` into a 256-bit cipher key with PBKDF2-HMAC-SHA256
pub fn stretch_key(key: &[u8], salt: &[u8], iterations: u32) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    if iterations == 0 {
        return Err(VaultError::KeyDerivation(
            "Iteration count must be positive".to_string(),
        ));
    }

    let mut output = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2::pbkdf2::<HmacSha256>(key, salt, iterations, &mut output[..])
        .map_err(|e| VaultError::KeyDerivation(e.to_string()))?;

    Ok(output)
}

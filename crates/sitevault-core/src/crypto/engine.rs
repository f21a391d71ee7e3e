//! Crypto Engine seam consumed by the record store and the account vault

use super::secure_memory::{self, SecretBytes};
use crate::error::Result;

/// Symmetric encryption capability used by the vault.
///
/// `encrypt` and `decrypt` take the key by value: the engine owns it for the
/// duration of the call and it is wiped when the call returns, whatever the
/// outcome. Callers that need the key again pass a clone.
pub trait CryptoEngine: Send + Sync {
    /// Derive the account key from a password and a pin
    fn derive_key(&self, password: &SecretBytes, pin: &SecretBytes) -> Result<SecretBytes>;

    /// Encrypt `plaintext` into a self-describing ciphertext
    fn encrypt(&self, plaintext: &[u8], key: SecretBytes, iterations: u32) -> Result<Vec<u8>>;

    /// Decrypt a ciphertext produced by [`CryptoEngine::encrypt`].
    ///
    /// Fails with `VaultError::WrongKey` when the key is wrong or the
    /// ciphertext was tampered with.
    fn decrypt(&self, ciphertext: &[u8], key: SecretBytes, iterations: u32) -> Result<SecretBytes>;

    /// Best-effort zeroing of a transient buffer
    fn wipe(&self, buffer: &mut [u8]) {
        secure_memory::wipe(buffer);
    }
}

//! Account vault: the encrypted blob file of each account and its lifecycle

use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{is_valid_language, VaultConfig};
use crate::crypto::{AesGcmEngine, CryptoEngine, SecretBytes};
use crate::error::{Result, VaultError};

/// Encrypted record store file inside an account directory
pub const BLOB_FILE: &str = "encryptedtext.bin";

/// Plaintext language tag file inside an account directory
pub const LANGUAGE_FILE: &str = "language.txt";

/// Per-site icon directory inside an account directory
pub const ICONS_DIR: &str = "icons";

/// Whether `account` is a usable identifier: non-empty, `[A-Za-z0-9_-]` only
pub fn is_valid_account_name(account: &str) -> bool {
    !account.is_empty()
        && account
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// [`is_valid_account_name`] as a `Validation` error
pub fn validate_account_name(account: &str) -> Result<()> {
    if is_valid_account_name(account) {
        Ok(())
    } else {
        Err(VaultError::Validation(format!(
            "Invalid account name: {:?}",
            account
        )))
    }
}

fn require_secret(value: &SecretBytes, what: &str) -> Result<()> {
    if value.is_empty() {
        return Err(VaultError::Validation(format!("{} must not be empty", what)));
    }
    Ok(())
}

/// Owns the account directories under the configured root.
///
/// Passwords, pins and plaintext payloads handed to this type are taken by
/// value and wiped before the call returns, including on failure.
pub struct AccountVault {
    accounts_dir: PathBuf,
    ui_icons_dir: PathBuf,
    default_language: String,
    engine: Arc<dyn CryptoEngine>,
    iterations: u32,
}

impl AccountVault {
    /// Create a vault with the default engine
    pub fn new(config: &VaultConfig) -> Result<Self> {
        Self::with_engine(config, Arc::new(AesGcmEngine::new()))
    }

    /// Create a vault with a custom engine
    pub fn with_engine(config: &VaultConfig, engine: Arc<dyn CryptoEngine>) -> Result<Self> {
        config.validate()?;

        // Ensure accounts directory exists
        fs::create_dir_all(&config.accounts_dir)?;

        debug!("Account vault initialized at: {:?}", config.accounts_dir);

        Ok(Self {
            accounts_dir: config.accounts_dir.clone(),
            ui_icons_dir: config.ui_icons_dir.clone(),
            default_language: config.default_language.clone(),
            engine,
            iterations: config.encryption_iterations,
        })
    }

    pub fn accounts_dir(&self) -> &Path {
        &self.accounts_dir
    }

    pub fn ui_icons_dir(&self) -> &Path {
        &self.ui_icons_dir
    }

    /// Language tag used by [`AccountVault::create`] when none is given
    pub fn default_language(&self) -> &str {
        &self.default_language
    }

    pub fn exists(&self, account: &str) -> Result<bool> {
        validate_account_name(account)?;
        Ok(self.accounts_dir.join(account).is_dir())
    }

    /// Directory of an existing account
    pub fn account_path(&self, account: &str) -> Result<PathBuf> {
        if !self.exists(account)? {
            return Err(VaultError::NotFound(format!("Account {}", account)));
        }
        Ok(self.accounts_dir.join(account))
    }

    /// Encrypted blob file of an existing account
    pub fn blob_path(&self, account: &str) -> Result<PathBuf> {
        Ok(self.account_path(account)?.join(BLOB_FILE))
    }

    /// Names of all account directories, sorted
    pub fn list_accounts(&self) -> Result<Vec<String>> {
        let mut accounts = Vec::new();
        for entry in fs::read_dir(&self.accounts_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                accounts.push(name.to_string());
            }
        }
        accounts.sort();
        Ok(accounts)
    }

    /// Create a new account holding an empty encrypted record store.
    ///
    /// `language` defaults to the configured default language.
    pub fn create(
        &self,
        account: &str,
        password: SecretBytes,
        pin: SecretBytes,
        language: Option<&str>,
    ) -> Result<()> {
        let language = language.unwrap_or(self.default_language.as_str());
        validate_account_name(account)?;
        require_secret(&password, "Password")?;
        require_secret(&pin, "Pin")?;
        if !is_valid_language(language) {
            return Err(VaultError::Validation(format!("Invalid language: {}", language)));
        }
        if self.exists(account)? {
            return Err(VaultError::Conflict(format!("Account {}", account)));
        }

        let blob = self.seal(&password, &pin, &[])?;

        let account_dir = self.accounts_dir.join(account);
        build_or_remove(&account_dir, |dir| {
            fs::create_dir(dir.join(ICONS_DIR))?;
            write_replace(&dir.join(BLOB_FILE), &blob)?;
            fs::write(dir.join(LANGUAGE_FILE), language)?;
            Ok(())
        })?;

        info!("Created account {}", account);
        Ok(())
    }

    /// Decrypt the account blob into the serialized record store
    pub fn load(&self, account: &str, password: SecretBytes, pin: SecretBytes) -> Result<SecretBytes> {
        require_secret(&password, "Password")?;
        require_secret(&pin, "Pin")?;
        let path = self.blob_path(account)?;

        let blob = fs::read(&path)?;
        let key = self
            .engine
            .derive_key(&password, &pin)
            .map_err(|e| VaultError::Decryption(e.to_string()))?;

        let data = self
            .engine
            .decrypt(&blob, key, self.iterations)
            .map_err(|e| {
                warn!("Failed to decrypt blob of account {}", account);
                VaultError::Decryption(e.to_string())
            })?;

        debug!("Loaded {} bytes for account {}", data.len(), account);
        Ok(data)
    }

    /// Encrypt `data` and replace the account blob with it
    pub fn dump(
        &self,
        account: &str,
        password: SecretBytes,
        pin: SecretBytes,
        data: SecretBytes,
    ) -> Result<()> {
        require_secret(&password, "Password")?;
        require_secret(&pin, "Pin")?;
        let path = self.blob_path(account)?;

        let blob = self.seal(&password, &pin, data.expose())?;
        write_replace(&path, &blob)?;

        debug!("Dumped {} bytes for account {}", data.len(), account);
        Ok(())
    }

    /// Destroy an account: shred the blob in place, then remove the directory
    pub fn delete(&self, account: &str) -> Result<()> {
        let account_dir = self.account_path(account)?;

        self.shred_blob(account)?;
        fs::remove_dir_all(&account_dir)?;

        info!("Deleted account {}", account);
        Ok(())
    }

    /// Overwrite the blob with random bytes of the same length
    pub(crate) fn shred_blob(&self, account: &str) -> Result<()> {
        let path = self.blob_path(account)?;
        if !path.is_file() {
            return Ok(());
        }

        // Old ciphertext is zeroed on every exit path
        let mut old = Zeroizing::new(fs::read(&path)?);
        let mut noise = vec![0u8; old.len()];
        OsRng.fill_bytes(&mut noise);

        let mut file = OpenOptions::new().write(true).open(&path)?;
        file.write_all(&noise)?;
        file.sync_all()?;

        self.engine.wipe(&mut old[..]);
        debug!("Shredded {} blob bytes of account {}", noise.len(), account);
        Ok(())
    }

    fn seal(&self, password: &SecretBytes, pin: &SecretBytes, plaintext: &[u8]) -> Result<Vec<u8>> {
        let key = self
            .engine
            .derive_key(password, pin)
            .map_err(|e| VaultError::Encryption(e.to_string()))?;

        self.engine
            .encrypt(plaintext, key, self.iterations)
            .map_err(|e| match e {
                err @ VaultError::Encryption(_) => err,
                other => VaultError::Encryption(other.to_string()),
            })
    }
}

impl std::fmt::Debug for AccountVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountVault")
            .field("accounts_dir", &self.accounts_dir)
            .field("iterations", &self.iterations)
            .finish()
    }
}

/// Create `dir` and fill it with `build`; remove it again if `build` fails
fn build_or_remove<F>(dir: &Path, build: F) -> Result<()>
where
    F: FnOnce(&Path) -> Result<()>,
{
    fs::create_dir(dir)?;

    if let Err(e) = build(dir) {
        if let Err(cleanup) = fs::remove_dir_all(dir) {
            warn!("Failed to remove partial account directory {:?}: {}", dir, cleanup);
        }
        return Err(e);
    }
    Ok(())
}

/// Write atomically using a temp file, then rename over `path`
fn write_replace(path: &Path, contents: &[u8]) -> Result<()> {
    let temp_path = path.with_extension("tmp");

    let written = (|| -> Result<()> {
        let mut file = File::create(&temp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, path)?;
        Ok(())
    })();

    if written.is_err() && temp_path.exists() {
        let _ = fs::remove_file(&temp_path);
    }
    written
}

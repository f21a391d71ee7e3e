//! Vault configuration
//!
//! Stores non-sensitive configuration in a plain JSON file: where account
//! directories live, where the built-in icons are, and the encryption work
//! factor. Readable without any password.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::crypto::DEFAULT_ITERATIONS;
use crate::error::{Result, VaultError};

fn default_iterations() -> u32 {
    DEFAULT_ITERATIONS
}

fn default_language() -> String {
    "en".to_string()
}

/// Vault configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultConfig {
    /// Directory holding one sub-directory per account
    pub accounts_dir: PathBuf,
    /// Directory of built-in fallback icons
    pub ui_icons_dir: PathBuf,
    /// PBKDF2 work factor for blob and field encryption
    #[serde(default = "default_iterations")]
    pub encryption_iterations: u32,
    /// Language tag written for new accounts
    #[serde(default = "default_language")]
    pub default_language: String,
}

impl VaultConfig {
    /// Configuration rooted in the platform data directory
    pub fn new() -> Result<Self> {
        Ok(Self::with_root(&Self::default_root()?))
    }

    /// Configuration rooted at `root` (tests, portable installs)
    pub fn with_root(root: &Path) -> Self {
        Self {
            accounts_dir: root.join("accounts"),
            ui_icons_dir: root.join("iconbank").join("iconui"),
            encryption_iterations: default_iterations(),
            default_language: default_language(),
        }
    }

    /// Get the platform data directory
    pub fn default_root() -> Result<PathBuf> {
        ProjectDirs::from("org", "sitevault", "sitevault")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or_else(|| VaultError::NotFound("Could not determine data directory".to_string()))
    }

    /// Load configuration from `path`, falling back to defaults when absent
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config file at {:?}, using defaults", path);
            return Self::new();
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;

        debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Save configuration to `path`
    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        let contents = serde_json::to_string_pretty(self)?;

        // Write atomically using temp file
        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, &contents)?;
        std::fs::rename(&temp_path, path)?;

        debug!("Saved config to {:?}", path);
        Ok(())
    }

    /// Reject values the vault cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.encryption_iterations == 0 {
            return Err(VaultError::Validation(
                "encryptionIterations must be positive".to_string(),
            ));
        }
        if !is_valid_language(&self.default_language) {
            return Err(VaultError::Validation(format!(
                "Invalid default language: {}",
                self.default_language
            )));
        }
        Ok(())
    }
}

/// Language tags are two ASCII letters, e.g. "en"
pub fn is_valid_language(language: &str) -> bool {
    language.len() == 2 && language.chars().all(|c| c.is_ascii_alphabetic())
}

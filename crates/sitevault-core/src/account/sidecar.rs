//! Non-secret account metadata: language tag and icon paths

use std::fs;
use std::path::PathBuf;
use tracing::debug;

use super::vault::{is_valid_account_name, AccountVault, ICONS_DIR, LANGUAGE_FILE};
use crate::config::is_valid_language;
use crate::error::{Result, VaultError};

/// Built-in icon used when a site has none
pub const DEFAULT_WEBSITE_ICON: &str = "default_website";

/// Built-in icon used when an account has no profile picture
pub const DEFAULT_PROFILE_ICON: &str = "default_profile";

/// Profile picture inside an account directory
pub const PROFILE_ICON_FILE: &str = "profile.png";

impl AccountVault {
    /// Language tag of an account
    pub fn language(&self, account: &str) -> Result<String> {
        let path = self.account_path(account)?.join(LANGUAGE_FILE);
        if !path.is_file() {
            return Err(VaultError::NotFound(format!(
                "Language file of account {}",
                account
            )));
        }
        Ok(fs::read_to_string(path)?.trim().to_string())
    }

    pub fn set_language(&self, account: &str, language: &str) -> Result<()> {
        if !is_valid_language(language) {
            return Err(VaultError::Validation(format!("Invalid language: {}", language)));
        }
        let path = self.account_path(account)?.join(LANGUAGE_FILE);
        fs::write(path, language)?;

        debug!("Set language of account {} to {}", account, language);
        Ok(())
    }

    /// Path of a built-in icon
    pub fn ui_icon_path(&self, icon_name: &str) -> Result<PathBuf> {
        let path = self.ui_icons_dir().join(format!("{}.png", icon_name));
        if !path.is_file() {
            return Err(VaultError::NotFound(format!("UI icon {:?}", path)));
        }
        Ok(path)
    }

    /// Icon of a site, or the built-in website icon when it has none
    pub fn site_icon_path(&self, account: &str, code: &str) -> Result<PathBuf> {
        let path = self.site_icon_file(account, code)?;
        if path.is_file() {
            return Ok(path);
        }
        self.ui_icon_path(DEFAULT_WEBSITE_ICON)
    }

    /// Profile picture of an account, or the built-in one when absent
    pub fn profile_icon_path(&self, account: &str) -> Result<PathBuf> {
        let path = self.account_path(account)?.join(PROFILE_ICON_FILE);
        if path.is_file() {
            return Ok(path);
        }
        self.ui_icon_path(DEFAULT_PROFILE_ICON)
    }

    /// Remove a site's icon if it has one
    pub fn remove_site_icon(&self, account: &str, code: &str) -> Result<()> {
        let path = self.site_icon_file(account, code)?;
        if path.is_file() {
            fs::remove_file(&path)?;
            debug!("Removed icon of site {} in account {}", code, account);
        }
        Ok(())
    }

    fn site_icon_file(&self, account: &str, code: &str) -> Result<PathBuf> {
        // Site codes become file names
        if !is_valid_account_name(code) {
            return Err(VaultError::Validation(format!("Invalid site code: {:?}", code)));
        }
        Ok(self
            .account_path(account)?
            .join(ICONS_DIR)
            .join(format!("{}.png", code)))
    }
}

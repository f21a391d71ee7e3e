//! Account storage: one directory per account holding the encrypted blob
//! and its plaintext sidecar files

mod sidecar;
mod vault;

pub use sidecar::{DEFAULT_PROFILE_ICON, DEFAULT_WEBSITE_ICON, PROFILE_ICON_FILE};
pub use vault::{
    is_valid_account_name, validate_account_name, AccountVault, BLOB_FILE, ICONS_DIR,
    LANGUAGE_FILE,
};

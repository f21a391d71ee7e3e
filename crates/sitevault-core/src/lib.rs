//! # sitevault-core
//!
//! Core of Sitevault, a local file-backed credential vault:
//! - One encrypted blob per account, created, loaded, saved and shredded by
//!   [`AccountVault`]
//! - An in-memory record store of per-site entries with optional
//!   field-level encryption, [`CredentialStore`]
//! - AES-256-GCM with PBKDF2 key stretching behind the [`CryptoEngine`] seam
//! - Secret buffers that are zeroed on drop

pub mod account;
pub mod config;
pub mod crypto;
pub mod error;
pub mod store;

pub use account::AccountVault;
pub use config::VaultConfig;
pub use crypto::{AesGcmEngine, CryptoEngine, SecretBytes};
pub use error::{Result, VaultError};
pub use store::{CredentialStore, SiteEntry, SiteField};

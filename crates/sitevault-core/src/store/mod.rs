//! Per-account record store: site entries, field pairs and field-level encryption

mod manager;
mod types;

pub use manager::CredentialStore;
pub use types::*;

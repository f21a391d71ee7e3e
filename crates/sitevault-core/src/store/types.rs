//! Record store type definitions

use serde::{Deserialize, Serialize};
use serde_json::Value;
use zeroize::Zeroize;

use crate::error::{Result, VaultError};

/// Length of generated site codes
pub const SITE_CODE_LEN: usize = 10;

/// Site codes reserved for internal bookkeeping.
///
/// Entries under these codes survive a load/dump round trip but are never
/// listed, looked up or created through the public accessors.
pub const RESERVED_SITE_CODES: &[&str] = &["__meta__", "__version__"];

/// Whether `code` is one of the [`RESERVED_SITE_CODES`]
pub fn is_reserved_code(code: &str) -> bool {
    RESERVED_SITE_CODES.contains(&code)
}

/// One `(field_type, field_value)` pair of a site's data.
///
/// Serialized as a two-element JSON array. When the owning site is flagged
/// encrypted, the stored value is the base64 text of a ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize)]
pub struct SiteField(String, String);

impl SiteField {
    pub fn new(field_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self(field_type.into(), value.into())
    }

    /// Kind of field, e.g. "login" or "password"
    pub fn field_type(&self) -> &str {
        &self.0
    }

    pub fn value(&self) -> &str {
        &self.1
    }

    pub(crate) fn with_value(&self, value: String) -> Self {
        Self(self.0.clone(), value)
    }
}

impl TryFrom<Vec<String>> for SiteField {
    type Error = VaultError;

    fn try_from(mut row: Vec<String>) -> Result<Self> {
        if row.len() != 2 {
            return Err(VaultError::Validation(format!(
                "Site field must have exactly 2 elements, got {}",
                row.len()
            )));
        }
        let value = row.pop().unwrap_or_default();
        let field_type = row.pop().unwrap_or_default();
        Ok(Self(field_type, value))
    }
}

/// Build site fields from untyped JSON (`[["type", "value"], ...]`).
///
/// Rejects anything that is not a list of string pairs.
pub fn fields_from_json(value: &Value) -> Result<Vec<SiteField>> {
    let rows = value
        .as_array()
        .ok_or_else(|| VaultError::Validation("Site data must be a list".to_string()))?;

    rows.iter()
        .enumerate()
        .map(|(index, row)| {
            let pair = row.as_array().filter(|pair| pair.len() == 2).ok_or_else(|| {
                VaultError::Validation(format!("Site field {} is not a pair", index))
            })?;
            match (pair[0].as_str(), pair[1].as_str()) {
                (Some(field_type), Some(value)) => Ok(SiteField::new(field_type, value)),
                _ => Err(VaultError::Validation(format!(
                    "Site field {} must contain two strings",
                    index
                ))),
            }
        })
        .collect()
}

/// One website record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SiteEntry {
    /// Display name
    pub name: String,

    /// Whether every value in `data` is stored as base64 ciphertext
    pub encrypted: bool,

    /// Ordered field pairs
    pub data: Vec<SiteField>,
}
